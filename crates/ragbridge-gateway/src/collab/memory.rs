use std::cmp::Ordering;

use dashmap::DashMap;

use ragbridge_core::error::Result;

use crate::collab::{Filter, ParentStore, ScoredChunk, StoredChunk, VectorStore};

/// Cosine similarity in `[-1, 1]`; 0 for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

/// Exact search over every stored vector.
#[derive(Default)]
pub struct MemoryVectorStore {
    chunks: DashMap<String, StoredChunk>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

fn matches(chunk: &StoredChunk, filter: &Filter) -> bool {
    filter.iter().all(|(k, v)| match k.as_str() {
        "source" => &chunk.source == v,
        _ => chunk.metadata.get(k) == Some(v),
    })
}

impl VectorStore for MemoryVectorStore {
    fn add(&self, chunks: Vec<StoredChunk>) -> Result<()> {
        for c in chunks {
            self.chunks.insert(c.id.clone(), c);
        }
        Ok(())
    }

    fn search(&self, query: &[f32], filter: &Filter, top_k: usize) -> Result<Vec<ScoredChunk>> {
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .filter(|e| matches(e.value(), filter))
            .map(|e| ScoredChunk {
                score: cosine_similarity(query, &e.value().vector),
                chunk: e.value().clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[derive(Default)]
pub struct MemoryParentStore {
    docs: DashMap<String, String>,
}

impl MemoryParentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParentStore for MemoryParentStore {
    fn get(&self, id: &str) -> Result<Option<String>> {
        Ok(self.docs.get(id).map(|d| d.value().clone()))
    }

    fn put(&self, id: &str, text: &str) -> Result<()> {
        self.docs.insert(id.to_string(), text.to_string());
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.docs.remove(id).is_some())
    }
}
