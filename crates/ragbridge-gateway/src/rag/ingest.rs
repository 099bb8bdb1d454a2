use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use ragbridge_core::error::{BridgeError, Result};

use crate::collab::{Embedder, ParentStore, StoredChunk, VectorStore};
use crate::config::RagSection;
use crate::rag::chunk::split_text;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub resource: String,
    pub chunks: usize,
}

/// Loads a text resource from the source directory, chunks and embeds it,
/// and stores the parent text plus the chunks.
pub struct DocumentIngestor {
    source_dir: PathBuf,
    chunk_size: usize,
    chunk_overlap: usize,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    parents: Arc<dyn ParentStore>,
}

impl DocumentIngestor {
    pub fn new(
        cfg: &RagSection,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        parents: Arc<dyn ParentStore>,
    ) -> Self {
        Self {
            source_dir: PathBuf::from(&cfg.source_dir),
            chunk_size: cfg.chunk_size,
            chunk_overlap: cfg.chunk_overlap,
            embedder,
            vectors,
            parents,
        }
    }

    /// Blocking. Run under `spawn_blocking`.
    pub fn ingest(&self, resource: &str) -> Result<IngestReport> {
        let path = self.resolve(resource)?;
        let text = std::fs::read_to_string(&path).map_err(|e| {
            BridgeError::HandlerFailure(format!("read {} failed: {e}", path.display()))
        })?;

        let pieces = split_text(&text, self.chunk_size, self.chunk_overlap);
        tracing::info!(%resource, chunks = pieces.len(), "resource split");

        let vectors = self.embedder.embed(&pieces)?;
        if vectors.len() != pieces.len() {
            return Err(BridgeError::HandlerFailure(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                pieces.len()
            )));
        }

        self.parents.put(resource, &text)?;

        let chunks: Vec<StoredChunk> = pieces
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (text, vector))| StoredChunk {
                id: format!("{resource}#{i}"),
                parent_id: resource.to_string(),
                text,
                source: resource.to_string(),
                metadata: BTreeMap::from([("chunk".to_string(), i.to_string())]),
                vector,
            })
            .collect();
        let count = chunks.len();
        self.vectors.add(chunks)?;

        Ok(IngestReport {
            resource: resource.to_string(),
            chunks: count,
        })
    }

    /// Resources are relative paths under the source directory.
    fn resolve(&self, resource: &str) -> Result<PathBuf> {
        let rel = Path::new(resource);
        if resource.trim().is_empty()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(BridgeError::BadRequest(format!("invalid resource: {resource:?}")));
        }
        let path = self.source_dir.join(rel);
        if !path.is_file() {
            return Err(BridgeError::HandlerFailure(format!(
                "resource not found: {}",
                path.display()
            )));
        }
        Ok(path)
    }
}
