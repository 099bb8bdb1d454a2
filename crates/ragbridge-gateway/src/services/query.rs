use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use ragbridge_core::error::{BridgeError, Result};

use crate::broker::BrokerRecord;
use crate::dispatch::{CommandHandler, DispatchMode};
use crate::rag::{QueryByRagRequest, RetrievalAnswerer};

pub const QUERY_BY_RAG: &str = "query-by-rag";

/// `query-by-rag`: answer a question from retrieved chunks. Awaited inline.
pub struct QueryByRagHandler {
    answerer: Arc<RetrievalAnswerer>,
}

impl QueryByRagHandler {
    pub fn new(answerer: Arc<RetrievalAnswerer>) -> Self {
        Self { answerer }
    }
}

#[async_trait]
impl CommandHandler for QueryByRagHandler {
    fn command(&self) -> &'static str {
        QUERY_BY_RAG
    }

    fn mode(&self) -> DispatchMode {
        DispatchMode::Inline
    }

    async fn handle(&self, record: BrokerRecord) -> Result<Option<Value>> {
        let req: QueryByRagRequest = serde_json::from_str(record.envelope.body())
            .map_err(|e| BridgeError::BadRequest(format!("query-by-rag invalid body: {e}")))?;

        let answerer = Arc::clone(&self.answerer);
        let result = tokio::task::spawn_blocking(move || answerer.answer(&req))
            .await
            .map_err(|e| BridgeError::HandlerFailure(format!("query task failed: {e}")))??;

        tracing::info!(hits = result.hits.len(), "query answered");
        serde_json::to_value(result)
            .map(Some)
            .map_err(|e| BridgeError::Internal(format!("result encode failed: {e}")))
    }
}
