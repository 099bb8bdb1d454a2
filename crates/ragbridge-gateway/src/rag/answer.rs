use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use ragbridge_core::error::{BridgeError, Result};

use crate::collab::{Embedder, Filter, LlmProvider, ScoredChunk, VectorStore};

const VECTOR_RETRIEVER: &str = "qdrant";
const NO_CONTEXT: &str = "No context";

/// Body of a `query-by-rag` command.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryByRagRequest {
    pub query: String,
    /// Falls back to `rag.default_top_k`.
    #[serde(default)]
    pub top_k: Option<usize>,
    /// LLM model override; empty means the provider default.
    #[serde(default)]
    pub llm: String,
    #[serde(default = "default_retriever")]
    pub retriever: String,
    #[serde(default)]
    pub filter: Filter,
}

fn default_retriever() -> String {
    VECTOR_RETRIEVER.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagHit {
    pub page_content: String,
    pub score: f32,
    pub source: String,
    pub metadata: BTreeMap<String, String>,
}

impl From<ScoredChunk> for RagHit {
    fn from(s: ScoredChunk) -> Self {
        Self {
            page_content: s.chunk.text,
            score: s.score,
            source: s.chunk.source,
            metadata: s.chunk.metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryByRagResult {
    pub answer: String,
    pub hits: Vec<RagHit>,
}

/// Embed the query, retrieve top-k chunks, and ask the LLM to answer from them.
pub struct RetrievalAnswerer {
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmProvider>,
    default_top_k: usize,
}

impl RetrievalAnswerer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        llm: Arc<dyn LlmProvider>,
        default_top_k: usize,
    ) -> Self {
        Self {
            embedder,
            vectors,
            llm,
            default_top_k,
        }
    }

    /// Blocking. Run under `spawn_blocking`.
    pub fn answer(&self, req: &QueryByRagRequest) -> Result<QueryByRagResult> {
        if req.query.trim().is_empty() {
            return Err(BridgeError::BadRequest("query must not be empty".into()));
        }
        if req.retriever != VECTOR_RETRIEVER {
            return Err(BridgeError::BadRequest(format!(
                "unsupported retriever: {}",
                req.retriever
            )));
        }
        let top_k = req.top_k.unwrap_or(self.default_top_k).clamp(1, 100);

        let query_vec = self
            .embedder
            .embed(std::slice::from_ref(&req.query))?
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::HandlerFailure("embedder returned no vector".into()))?;

        let hits: Vec<RagHit> = self
            .vectors
            .search(&query_vec, &req.filter, top_k)?
            .into_iter()
            .map(RagHit::from)
            .collect();
        tracing::debug!(hits = hits.len(), top_k, "retrieval done");

        let prompt = build_prompt(&hits, &req.query);
        let answer = self.llm.invoke(&prompt, Some(req.llm.as_str()))?;

        Ok(QueryByRagResult { answer, hits })
    }
}

fn build_prompt(hits: &[RagHit], question: &str) -> String {
    let context = if hits.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        hits.iter()
            .map(|h| h.page_content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    format!(
        "You are an assistant answering strictly from the provided context.\n\
         If the context does not contain the answer, say that it cannot be \
         confirmed from the provided documents.\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n"
    )
}
