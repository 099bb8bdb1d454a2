//! Broker ports and the consume loop.
//!
//! The bridge talks to the broker only through [`BrokerProducer`] and
//! [`BrokerConsumer`]. `kafka` implements them over rdkafka; `memory` is an
//! in-process loopback used for local runs and tests.

pub mod consumer;
pub mod kafka;
pub mod memory;
pub mod producer;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

use ragbridge_core::error::Result;
use ragbridge_core::protocol::{frame, Envelope};

use crate::config::{BrokerKind, BrokerSection};

pub use consumer::{
    CommitCursor, CommitPolicy, ConsumerLoop, ConsumerStatus, LoopSettings, LoopState,
    RecordHandler,
};
pub use producer::ProducerPort;

/// Sending half of a broker connection.
#[async_trait]
pub trait BrokerProducer: Send + Sync {
    /// Send one record and wait for the broker's acknowledgement.
    async fn send(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<()>;
    /// Flush in-flight sends and release the connection.
    async fn close(&self);
}

/// Receiving half of a broker connection.
///
/// `next_record` must be cancel-safe: the consume loop races it against a
/// poll timeout and the stop signal.
#[async_trait]
pub trait BrokerConsumer: Send + Sync {
    /// Join the consumer group on `topics`. Fails if the broker is unreachable.
    async fn subscribe(&self, topics: &[&str]) -> Result<()>;
    async fn next_record(&self) -> Result<RawRecord>;
    /// Commit the given positions (next offset to read, per partition).
    async fn commit(&self, offsets: &[CommitOffset]) -> Result<()>;
    async fn close(&self);
}

/// Record exactly as the broker hands it over.
#[derive(Debug, Clone)]
pub struct RawRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Bytes>,
    pub headers: Vec<(String, Option<Vec<u8>>)>,
    pub timestamp: Option<i64>,
}

/// Decoded, read-only view of one record, alive for a single dispatch.
#[derive(Debug, Clone)]
pub struct BrokerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub envelope: Envelope,
    pub headers: BTreeMap<String, String>,
    pub timestamp: Option<i64>,
    pub consumed_at: SystemTime,
}

impl BrokerRecord {
    /// Decode the value of a raw record. `None` when the value is absent.
    pub fn decode(raw: RawRecord) -> Option<Result<Self>> {
        let value = raw.value?;
        Some(frame::decode(&value).map(|envelope| Self {
            topic: raw.topic,
            partition: raw.partition,
            offset: raw.offset,
            key: raw.key.as_deref().map(frame::normalize_header_value),
            envelope,
            headers: raw
                .headers
                .into_iter()
                .map(|(k, v)| (k, v.as_deref().map(frame::normalize_header_value).unwrap_or_default()))
                .collect(),
            timestamp: raw.timestamp,
            consumed_at: SystemTime::now(),
        }))
    }
}

/// Position to commit for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOffset {
    pub topic: String,
    pub partition: i32,
    /// Next offset to read (last dispatched + 1).
    pub offset: i64,
}

/// Open both halves of the configured broker.
///
/// For `kind: kafka` this probes the cluster and fails with
/// `BrokerUnavailable` if it cannot be reached.
pub async fn connect(
    cfg: &BrokerSection,
) -> Result<(Arc<dyn BrokerProducer>, Arc<dyn BrokerConsumer>)> {
    match cfg.kind {
        BrokerKind::Kafka => {
            let producer = kafka::KafkaProducer::connect(cfg).await?;
            let consumer = kafka::KafkaConsumer::create(cfg)?;
            Ok((Arc::new(producer), Arc::new(consumer)))
        }
        BrokerKind::Memory => {
            let broker = memory::MemoryBroker::new();
            Ok((Arc::new(broker.producer()), Arc::new(broker.consumer())))
        }
    }
}
