//! Kafka adapter over rdkafka.
//!
//! Producer: `acks=all` + idempotence. Consumer: auto-commit off, positions
//! committed explicitly by the consume loop.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};

use ragbridge_core::error::{BridgeError, Result};

use crate::broker::{BrokerConsumer, BrokerProducer, CommitOffset, RawRecord};
use crate::config::BrokerSection;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

fn unavailable(ctx: &str, e: impl std::fmt::Display) -> BridgeError {
    BridgeError::BrokerUnavailable(format!("{ctx}: {e}"))
}

pub struct KafkaProducer {
    inner: FutureProducer,
    send_timeout: Duration,
}

impl KafkaProducer {
    /// Create the producer and confirm the cluster answers a metadata request.
    pub async fn connect(cfg: &BrokerSection) -> Result<Self> {
        let inner: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &cfg.bootstrap_servers)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("linger.ms", cfg.linger_ms.to_string())
            .set("message.timeout.ms", cfg.send_timeout_ms.to_string())
            .create()
            .map_err(|e| unavailable("producer create failed", e))?;

        let probe = inner.clone();
        let connect_timeout = Duration::from_millis(cfg.connect_timeout_ms);
        let brokers = tokio::task::spawn_blocking(move || {
            probe
                .client()
                .fetch_metadata(None, connect_timeout)
                .map(|md| md.brokers().len())
        })
        .await
        .map_err(|e| BridgeError::Internal(format!("metadata probe join failed: {e}")))?
        .map_err(|e| unavailable("broker unreachable", e))?;

        tracing::info!(servers = %cfg.bootstrap_servers, brokers, "kafka producer connected");
        Ok(Self {
            inner,
            send_timeout: Duration::from_millis(cfg.send_timeout_ms),
        })
    }
}

#[async_trait]
impl BrokerProducer for KafkaProducer {
    async fn send(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<()> {
        let mut record: FutureRecord<'_, [u8], [u8]> = FutureRecord::to(topic).payload(payload);
        if let Some(k) = key {
            record = record.key(k);
        }
        self.inner
            .send(record, Timeout::After(self.send_timeout))
            .await
            .map(|_| ())
            .map_err(|(e, _)| unavailable("delivery failed", e))
    }

    async fn close(&self) {
        let producer = self.inner.clone();
        match tokio::task::spawn_blocking(move || producer.flush(FLUSH_TIMEOUT)).await {
            Ok(Ok(())) => tracing::info!("kafka producer flushed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "kafka producer flush failed"),
            Err(e) => tracing::warn!(error = %e, "kafka producer flush task failed"),
        }
    }
}

pub struct KafkaConsumer {
    inner: Arc<StreamConsumer>,
    connect_timeout: Duration,
}

impl KafkaConsumer {
    pub fn create(cfg: &BrokerSection) -> Result<Self> {
        let inner: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &cfg.bootstrap_servers)
            .set("group.id", &cfg.group_id)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false")
            .set("auto.offset.reset", cfg.auto_offset_reset.as_str())
            .set("session.timeout.ms", cfg.session_timeout_ms.to_string())
            .set("heartbeat.interval.ms", cfg.heartbeat_interval_ms.to_string())
            .set("max.poll.interval.ms", cfg.max_poll_interval_ms.to_string())
            .create()
            .map_err(|e| unavailable("consumer create failed", e))?;

        Ok(Self {
            inner: Arc::new(inner),
            connect_timeout: Duration::from_millis(cfg.connect_timeout_ms),
        })
    }
}

#[async_trait]
impl BrokerConsumer for KafkaConsumer {
    async fn subscribe(&self, topics: &[&str]) -> Result<()> {
        let probe = Arc::clone(&self.inner);
        let connect_timeout = self.connect_timeout;
        tokio::task::spawn_blocking(move || probe.fetch_metadata(None, connect_timeout).map(|_| ()))
            .await
            .map_err(|e| BridgeError::Internal(format!("metadata probe join failed: {e}")))?
            .map_err(|e| unavailable("broker unreachable", e))?;

        self.inner
            .subscribe(topics)
            .map_err(|e| unavailable("subscribe failed", e))?;
        tracing::info!(?topics, "kafka consumer subscribed");
        Ok(())
    }

    async fn next_record(&self) -> Result<RawRecord> {
        let msg = self
            .inner
            .recv()
            .await
            .map_err(|e| unavailable("poll failed", e))?;

        let headers = msg
            .headers()
            .map(|hs| {
                hs.iter()
                    .map(|h| (h.key.to_string(), h.value.map(<[u8]>::to_vec)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(RawRecord {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key: msg.key().map(<[u8]>::to_vec),
            value: msg.payload().map(Bytes::copy_from_slice),
            headers,
            timestamp: msg.timestamp().to_millis(),
        })
    }

    async fn commit(&self, offsets: &[CommitOffset]) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        for o in offsets {
            tpl.add_partition_offset(&o.topic, o.partition, Offset::Offset(o.offset))
                .map_err(|e| BridgeError::Internal(format!("commit list build failed: {e}")))?;
        }
        // sync so a rejected commit reaches the loop instead of a callback
        let consumer = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || consumer.commit(&tpl, CommitMode::Sync))
            .await
            .map_err(|e| BridgeError::Internal(format!("commit join failed: {e}")))?
            .map_err(|e| unavailable("commit failed", e))
    }

    async fn close(&self) {
        self.inner.unsubscribe();
        tracing::info!("kafka consumer unsubscribed");
    }
}
