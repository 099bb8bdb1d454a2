//! Shared application state.
//!
//! Wires metrics, the connection hub, the detached task registry, the
//! command dispatcher with its built-in handlers, and the running bridge.

use std::sync::Arc;
use std::time::Duration;

use ragbridge_core::error::Result;

use crate::broker::{self, BrokerConsumer, BrokerProducer, LoopSettings, LoopState, ProducerPort};
use crate::collab::{
    Embedder, LlmProvider, MemoryParentStore, MemoryVectorStore, OllamaClient, ParentStore,
    VectorStore,
};
use crate::config::{BridgeConfig, RagSection};
use crate::dispatch::{CommandDispatcher, TaskRegistry};
use crate::hub::ConnectionHub;
use crate::lifecycle::Bridge;
use crate::obs::BridgeMetrics;
use crate::rag::{DocumentIngestor, RetrievalAnswerer};
use crate::services::{PipelineStartHandler, QueryByRagHandler};

/// The four external capabilities the handlers depend on.
#[derive(Clone)]
pub struct Collaborators {
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LlmProvider>,
    pub vectors: Arc<dyn VectorStore>,
    pub parents: Arc<dyn ParentStore>,
}

impl Collaborators {
    /// Ollama for embeddings and generation, in-memory stores.
    pub fn from_config(cfg: &RagSection) -> Self {
        let ollama = Arc::new(OllamaClient::new(cfg));
        Self {
            embedder: ollama.clone(),
            llm: ollama,
            vectors: Arc::new(MemoryVectorStore::new()),
            parents: Arc::new(MemoryParentStore::new()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: BridgeConfig,
    metrics: Arc<BridgeMetrics>,
    hub: Arc<ConnectionHub>,
    tasks: Arc<TaskRegistry>,
    dispatcher: Arc<CommandDispatcher>,
    bridge: Bridge,
}

impl AppState {
    /// Connect to the configured broker and start the bridge.
    /// Returns `BrokerUnavailable` if the broker cannot be reached.
    pub async fn new(cfg: BridgeConfig) -> Result<Self> {
        let (producer, consumer) = broker::connect(&cfg.broker).await?;
        let collab = Collaborators::from_config(&cfg.rag);
        Self::with_parts(cfg, producer, consumer, collab).await
    }

    /// Build on explicit broker halves and collaborators.
    pub async fn with_parts(
        cfg: BridgeConfig,
        producer: Arc<dyn BrokerProducer>,
        consumer: Arc<dyn BrokerConsumer>,
        collab: Collaborators,
    ) -> Result<Self> {
        let metrics = Arc::new(BridgeMetrics::default());
        let hub = Arc::new(ConnectionHub::new(
            Duration::from_millis(cfg.hub.send_timeout_ms),
            Arc::clone(&metrics),
        ));
        let tasks = Arc::new(TaskRegistry::new(Arc::clone(&metrics)));
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&hub),
            Arc::clone(&tasks),
            Arc::clone(&metrics),
        ));

        let ingestor = Arc::new(DocumentIngestor::new(
            &cfg.rag,
            Arc::clone(&collab.embedder),
            Arc::clone(&collab.vectors),
            Arc::clone(&collab.parents),
        ));
        let answerer = Arc::new(RetrievalAnswerer::new(
            Arc::clone(&collab.embedder),
            Arc::clone(&collab.vectors),
            Arc::clone(&collab.llm),
            cfg.rag.default_top_k,
        ));
        dispatcher.register(Arc::new(PipelineStartHandler::new(ingestor)));
        dispatcher.register(Arc::new(QueryByRagHandler::new(answerer)));
        tracing::info!(commands = ?dispatcher.registered_commands(), "command handlers registered");

        let bridge = Bridge::start(
            producer,
            consumer,
            dispatcher.clone(),
            LoopSettings::from_config(&cfg.broker),
            Arc::clone(&metrics),
        )
        .await?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                metrics,
                hub,
                tasks,
                dispatcher,
                bridge,
            }),
        })
    }

    pub fn cfg(&self) -> &BridgeConfig {
        &self.inner.cfg
    }

    pub fn metrics(&self) -> Arc<BridgeMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn hub(&self) -> Arc<ConnectionHub> {
        Arc::clone(&self.inner.hub)
    }

    pub fn tasks(&self) -> Arc<TaskRegistry> {
        Arc::clone(&self.inner.tasks)
    }

    pub fn dispatcher(&self) -> Arc<CommandDispatcher> {
        Arc::clone(&self.inner.dispatcher)
    }

    pub fn producer(&self) -> &ProducerPort {
        self.inner.bridge.producer()
    }

    pub fn produce_topic(&self) -> &str {
        &self.inner.cfg.broker.produce_topic
    }

    pub fn consumer_state(&self) -> LoopState {
        self.inner.bridge.status().get()
    }

    pub fn is_ready(&self) -> bool {
        self.consumer_state() == LoopState::Running
    }

    /// Gauges that live outside the metrics registry.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![("ragbridge_consumer_state", self.consumer_state() as u64)]
    }

    /// Stop the bridge, then wait (bounded) for detached handler tasks.
    pub async fn shutdown(&self) {
        self.inner.bridge.stop().await;
        let grace = Duration::from_millis(self.inner.cfg.workers.shutdown_grace_ms);
        let aborted = self.inner.tasks.shutdown(grace).await;
        tracing::info!(aborted, "shutdown complete");
    }
}
