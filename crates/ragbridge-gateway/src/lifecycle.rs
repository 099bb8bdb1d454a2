//! Starts and stops the broker producer and consume loop together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;

use ragbridge_core::error::{BridgeError, Result};

use crate::broker::{
    BrokerConsumer, BrokerProducer, ConsumerLoop, ConsumerStatus, LoopSettings, ProducerPort,
    RecordHandler,
};
use crate::obs::BridgeMetrics;

pub struct Bridge {
    producer: ProducerPort,
    consumer_loop: ConsumerLoop,
    stopped: AtomicBool,
}

impl Bridge {
    /// Bind the producer to the current runtime and start the consume loop.
    ///
    /// Must be called from inside a tokio runtime; fails with
    /// `SchedulerUnset` otherwise, or `BrokerUnavailable` if the consumer
    /// cannot subscribe.
    pub async fn start(
        producer: Arc<dyn BrokerProducer>,
        consumer: Arc<dyn BrokerConsumer>,
        handler: Arc<dyn RecordHandler>,
        settings: LoopSettings,
        metrics: Arc<BridgeMetrics>,
    ) -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| BridgeError::SchedulerUnset)?;
        let producer = ProducerPort::new(producer, Arc::clone(&metrics)).with_scheduler(handle);
        let consumer_loop = ConsumerLoop::new(Arc::clone(&consumer), handler, settings, metrics);

        if let Err(e) = consumer_loop.start().await {
            tracing::error!(error = %e, "bridge start failed");
            consumer.close().await;
            producer.close().await;
            return Err(e);
        }

        tracing::info!("bridge started");
        Ok(Self {
            producer,
            consumer_loop,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn producer(&self) -> &ProducerPort {
        &self.producer
    }

    pub fn status(&self) -> ConsumerStatus {
        self.consumer_loop.status()
    }

    /// Stop the loop (joined, consumer closed), then close the producer.
    /// Later calls are no-ops.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.consumer_loop.stop().await;
        self.producer.close().await;
        tracing::info!("bridge stopped");
    }
}
