/// Split `text` into chunks of at most `chunk_size` characters.
///
/// Paragraphs (blank-line separated) are packed greedily. A paragraph longer
/// than `chunk_size` is cut into windows that overlap by `overlap`
/// characters. Sizes count `char`s, not bytes.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);

    let normalized = text.replace("\r\n", "\n");
    let mut pieces = Vec::new();
    for para in normalized.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if para.chars().count() <= chunk_size {
            pieces.push(para.to_string());
        } else {
            pieces.extend(windows(para, chunk_size, overlap));
        }
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for piece in pieces {
        let piece_len = piece.chars().count();
        if current.is_empty() {
            current = piece;
            current_len = piece_len;
        } else if current_len + 2 + piece_len <= chunk_size {
            current.push_str("\n\n");
            current.push_str(&piece);
            current_len += 2 + piece_len;
        } else {
            chunks.push(std::mem::replace(&mut current, piece));
            current_len = piece_len;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn windows(para: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = para.chars().collect();
    let step = size - overlap;
    let mut out = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        out.push(chars[start..end].iter().collect::<String>().trim().to_string());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    out.retain(|w| !w.is_empty());
    out
}
