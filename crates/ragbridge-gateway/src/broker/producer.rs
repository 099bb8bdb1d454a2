use std::sync::Arc;

use tokio::runtime::Handle;

use ragbridge_core::error::{BridgeError, Result};
use ragbridge_core::protocol::{frame, Envelope};

use crate::broker::BrokerProducer;
use crate::obs::BridgeMetrics;

/// Envelope-level producer shared by the HTTP surface and handlers.
///
/// Wraps a [`BrokerProducer`] with encoding, metrics and an explicit runtime
/// handle so code running on plain OS threads can publish.
#[derive(Clone)]
pub struct ProducerPort {
    inner: Arc<dyn BrokerProducer>,
    scheduler: Option<Handle>,
    metrics: Arc<BridgeMetrics>,
}

impl ProducerPort {
    pub fn new(inner: Arc<dyn BrokerProducer>, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            inner,
            scheduler: None,
            metrics,
        }
    }

    /// Bind the runtime that owns the broker connection.
    pub fn with_scheduler(mut self, handle: Handle) -> Self {
        self.scheduler = Some(handle);
        self
    }

    pub fn has_scheduler(&self) -> bool {
        self.scheduler.is_some()
    }

    pub async fn send(&self, topic: &str, key: Option<&str>, env: &Envelope) -> Result<()> {
        send_encoded(&*self.inner, &self.metrics, topic, key, env).await
    }

    /// Schedule a send on the owning runtime from any thread.
    ///
    /// Returns once the send is queued. The outcome of the send itself is
    /// logged by the scheduled task.
    pub fn send_from_any_thread(
        &self,
        topic: &str,
        key: Option<&str>,
        env: Envelope,
    ) -> Result<()> {
        let Some(handle) = self.scheduler.as_ref() else {
            tracing::error!(%topic, command = %env.command(), "producer has no runtime handle; send not attempted");
            return Err(BridgeError::SchedulerUnset);
        };

        let inner = Arc::clone(&self.inner);
        let metrics = Arc::clone(&self.metrics);
        let topic = topic.to_string();
        let key = key.map(str::to_string);
        handle.spawn(async move {
            if let Err(e) = send_encoded(&*inner, &metrics, &topic, key.as_deref(), &env).await {
                tracing::warn!(%topic, command = %env.command(), error = %e, "scheduled send failed");
            }
        });
        Ok(())
    }

    pub async fn close(&self) {
        self.inner.close().await;
    }
}

async fn send_encoded(
    producer: &dyn BrokerProducer,
    metrics: &BridgeMetrics,
    topic: &str,
    key: Option<&str>,
    env: &Envelope,
) -> Result<()> {
    let payload = frame::to_bytes(env)?;
    let res = producer
        .send(topic, key.map(str::as_bytes), &payload)
        .await;
    let outcome = if res.is_ok() { "ok" } else { "error" };
    metrics.produced.inc(&[("topic", topic), ("outcome", outcome)]);
    res
}
