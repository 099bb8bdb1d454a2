use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use ragbridge_core::error::{BridgeError, Result};

use crate::broker::BrokerRecord;
use crate::dispatch::{CommandHandler, DispatchMode};
use crate::rag::DocumentIngestor;

pub const PIPELINE_START: &str = "pipeline-start";

/// `pipeline-start`: ingest the resource named by the body. Long-running,
/// so it runs detached from the consume loop.
pub struct PipelineStartHandler {
    ingestor: Arc<DocumentIngestor>,
}

impl PipelineStartHandler {
    pub fn new(ingestor: Arc<DocumentIngestor>) -> Self {
        Self { ingestor }
    }
}

#[async_trait]
impl CommandHandler for PipelineStartHandler {
    fn command(&self) -> &'static str {
        PIPELINE_START
    }

    fn mode(&self) -> DispatchMode {
        DispatchMode::Detached
    }

    async fn handle(&self, record: BrokerRecord) -> Result<Option<Value>> {
        let resource = record.envelope.body().trim().to_string();
        if resource.is_empty() {
            return Err(BridgeError::BadRequest("pipeline-start requires a resource".into()));
        }

        let ingestor = Arc::clone(&self.ingestor);
        let name = resource.clone();
        let report = tokio::task::spawn_blocking(move || ingestor.ingest(&name))
            .await
            .map_err(|e| BridgeError::HandlerFailure(format!("ingest task failed: {e}")))??;

        tracing::info!(resource = %report.resource, chunks = report.chunks, "ingestion completed");
        Ok(Some(json!({
            "answer": format!("{resource}: upload completed."),
            "hits": [],
        })))
    }
}
