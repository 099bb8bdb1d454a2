//! Capability interfaces for the external collaborators the handlers use.
//!
//! All calls are blocking; handlers run them under `spawn_blocking`.

pub mod memory;
pub mod ollama;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ragbridge_core::error::Result;

pub use memory::{cosine_similarity, MemoryParentStore, MemoryVectorStore};
pub use ollama::OllamaClient;

/// Exact-match metadata filter (`key == value` for every entry).
pub type Filter = BTreeMap<String, String>;

/// One embedded chunk as stored in the vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredChunk {
    pub id: String,
    /// Key of the full source text in the parent store.
    pub parent_id: String,
    pub text: String,
    pub source: String,
    pub metadata: BTreeMap<String, String>,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: StoredChunk,
    pub score: f32,
}

pub trait Embedder: Send + Sync {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub trait LlmProvider: Send + Sync {
    /// `model` overrides the provider's default when non-empty.
    fn invoke(&self, prompt: &str, model: Option<&str>) -> Result<String>;
}

pub trait VectorStore: Send + Sync {
    fn add(&self, chunks: Vec<StoredChunk>) -> Result<()>;
    fn search(&self, query: &[f32], filter: &Filter, top_k: usize) -> Result<Vec<ScoredChunk>>;
}

/// Parent-document text keyed by id.
pub trait ParentStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<String>>;
    fn put(&self, id: &str, text: &str) -> Result<()>;
    fn delete(&self, id: &str) -> Result<bool>;
}
