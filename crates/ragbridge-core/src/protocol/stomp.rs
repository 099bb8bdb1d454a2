//! STOMP text frames (client lane).
//!
//! WebSocket clients speak STOMP-style text frames:
//!
//! ```text
//! COMMAND\n
//! key:value\n
//! \n
//! body\0
//! ```
//!
//! Parsing rules:
//! - CRLF and bare CR are normalised to LF before anything else, body included.
//! - Leading blank lines are heart-beats and are skipped.
//! - The first occurrence of a repeated header wins (STOMP 1.2).
//! - Header escapes `\\`, `\n`, `\r`, `\c` are decoded; any other escape is malformed.
//! - The body runs to the first NUL, or to the end if the frame is unterminated.

use std::collections::BTreeMap;

use crate::error::{BridgeError, Result};
use crate::protocol::envelope::Envelope;

/// Decode one STOMP text frame.
pub fn decode(raw: &str) -> Result<Envelope> {
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");
    let text = text.trim_start_matches('\n');

    let (command_line, mut rest) = match text.split_once('\n') {
        Some((line, rest)) => (line, rest),
        None => (text.trim_end_matches('\0'), ""),
    };
    let command = command_line.trim();
    if command.is_empty() {
        return Err(BridgeError::MalformedFrame("missing command".into()));
    }

    let mut headers = BTreeMap::new();
    let mut body = "";
    loop {
        let (line, next) = match rest.split_once('\n') {
            Some((line, next)) => (line, Some(next)),
            None => (rest, None),
        };

        if line.is_empty() {
            // blank line ends the header block
            if let Some(next) = next {
                body = next;
            }
            break;
        }
        if line.starts_with('\0') {
            break;
        }

        let (k, v) = line
            .split_once(':')
            .ok_or_else(|| BridgeError::MalformedFrame(format!("header line without ':': {line}")))?;
        let key = unescape(k)?;
        let value = unescape(v.trim_end_matches('\0'))?;
        if headers.contains_key(&key) {
            tracing::debug!(header = %key, "repeated stomp header ignored");
        } else {
            headers.insert(key, value);
        }

        match next {
            Some(next) => rest = next,
            None => break,
        }
    }

    let body = match body.find('\0') {
        Some(end) => &body[..end],
        None => body,
    };

    Envelope::new(command, headers, body)
}

/// Encode an envelope as a NUL-terminated STOMP text frame.
///
/// Bodies containing NUL cannot be framed without `content-length` and are
/// rejected. The command is written trimmed, the same way `decode` reads it.
pub fn encode(env: &Envelope) -> Result<String> {
    if env.body().contains('\0') {
        return Err(BridgeError::BadRequest("stomp body must not contain NUL".into()));
    }
    if env.command().contains(['\n', '\r']) {
        return Err(BridgeError::BadRequest("stomp command must be a single line".into()));
    }
    let command = env.command().trim();

    let mut out = String::with_capacity(command.len() + env.body().len() + 16);
    out.push_str(command);
    out.push('\n');
    for (k, v) in env.headers() {
        out.push_str(&escape(k));
        out.push(':');
        out.push_str(&escape(v));
        out.push('\n');
    }
    out.push('\n');
    out.push_str(env.body());
    out.push('\0');
    Ok(out)
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some(other) => {
                return Err(BridgeError::MalformedFrame(format!(
                    "undefined header escape: \\{other}"
                )))
            }
            None => return Err(BridgeError::MalformedFrame("dangling header escape".into())),
        }
    }
    Ok(out)
}
