//! Retrieval-augmented generation services behind the command handlers.

pub mod answer;
pub mod chunk;
pub mod ingest;

pub use answer::{QueryByRagRequest, QueryByRagResult, RagHit, RetrievalAnswerer};
pub use chunk::split_text;
pub use ingest::{DocumentIngestor, IngestReport};
