//! In-process loopback broker.
//!
//! Producer sends land in per-topic logs; the consumer sees records for its
//! subscribed topics published after it subscribed (`latest` reset).
//! Commits are recorded so callers can inspect them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, Notify};

use ragbridge_core::error::{BridgeError, Result};

use crate::broker::{BrokerConsumer, BrokerProducer, CommitOffset, RawRecord};

#[derive(Default)]
struct BrokerState {
    next_offsets: HashMap<String, i64>,
    subscriptions: HashSet<String>,
    queue: VecDeque<RawRecord>,
    poll_error: Option<String>,
    subscribe_error: Option<String>,
    commit_error: Option<String>,
    commit_calls: usize,
    committed: HashMap<(String, i32), i64>,
    consumer_closed: bool,
    producer_closed: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<BrokerState>,
    ready: Notify,
}

/// Handle to one in-process broker. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn producer(&self) -> MemoryProducer {
        MemoryProducer {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn consumer(&self) -> MemoryConsumer {
        MemoryConsumer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Append a record with an arbitrary (possibly absent) value.
    /// Returns the assigned offset.
    pub async fn publish_raw(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        value: Option<Vec<u8>>,
        headers: Vec<(String, Option<Vec<u8>>)>,
    ) -> i64 {
        publish(&self.shared, topic, key, value, headers).await
    }

    /// Make the next poll fail with `BrokerUnavailable`.
    pub async fn fail_next_poll(&self, reason: impl Into<String>) {
        self.shared.state.lock().await.poll_error = Some(reason.into());
        self.shared.ready.notify_one();
    }

    /// Make the next subscribe fail with `BrokerUnavailable`.
    pub async fn fail_next_subscribe(&self, reason: impl Into<String>) {
        self.shared.state.lock().await.subscribe_error = Some(reason.into());
    }

    /// Make the next commit fail with `BrokerUnavailable`; nothing is recorded.
    pub async fn fail_next_commit(&self, reason: impl Into<String>) {
        self.shared.state.lock().await.commit_error = Some(reason.into());
    }

    pub async fn commit_calls(&self) -> usize {
        self.shared.state.lock().await.commit_calls
    }

    /// Last committed position (next offset to read) for a partition.
    pub async fn committed(&self, topic: &str, partition: i32) -> Option<i64> {
        self.shared
            .state
            .lock()
            .await
            .committed
            .get(&(topic.to_string(), partition))
            .copied()
    }

    pub async fn is_consumer_closed(&self) -> bool {
        self.shared.state.lock().await.consumer_closed
    }

    pub async fn is_producer_closed(&self) -> bool {
        self.shared.state.lock().await.producer_closed
    }
}

async fn publish(
    shared: &Shared,
    topic: &str,
    key: Option<&[u8]>,
    value: Option<Vec<u8>>,
    headers: Vec<(String, Option<Vec<u8>>)>,
) -> i64 {
    let mut st = shared.state.lock().await;
    let slot = st.next_offsets.entry(topic.to_string()).or_insert(0);
    let offset = *slot;
    *slot += 1;

    if st.subscriptions.contains(topic) {
        st.queue.push_back(RawRecord {
            topic: topic.to_string(),
            partition: 0,
            offset,
            key: key.map(<[u8]>::to_vec),
            value: value.map(Bytes::from),
            headers,
            timestamp: None,
        });
        drop(st);
        shared.ready.notify_one();
    } else {
        tracing::debug!(%topic, offset, "no subscriber; record not delivered");
    }
    offset
}

pub struct MemoryProducer {
    shared: Arc<Shared>,
}

#[async_trait]
impl BrokerProducer for MemoryProducer {
    async fn send(&self, topic: &str, key: Option<&[u8]>, payload: &[u8]) -> Result<()> {
        if self.shared.state.lock().await.producer_closed {
            return Err(BridgeError::BrokerUnavailable("producer closed".into()));
        }
        publish(&self.shared, topic, key, Some(payload.to_vec()), Vec::new()).await;
        Ok(())
    }

    async fn close(&self) {
        self.shared.state.lock().await.producer_closed = true;
    }
}

pub struct MemoryConsumer {
    shared: Arc<Shared>,
}

#[async_trait]
impl BrokerConsumer for MemoryConsumer {
    async fn subscribe(&self, topics: &[&str]) -> Result<()> {
        let mut st = self.shared.state.lock().await;
        if st.consumer_closed {
            return Err(BridgeError::BrokerUnavailable("consumer closed".into()));
        }
        if let Some(reason) = st.subscribe_error.take() {
            return Err(BridgeError::BrokerUnavailable(reason));
        }
        st.subscriptions = topics.iter().map(|t| t.to_string()).collect();
        Ok(())
    }

    async fn next_record(&self) -> Result<RawRecord> {
        loop {
            {
                let mut st = self.shared.state.lock().await;
                if st.consumer_closed {
                    return Err(BridgeError::BrokerUnavailable("consumer closed".into()));
                }
                if let Some(reason) = st.poll_error.take() {
                    return Err(BridgeError::BrokerUnavailable(reason));
                }
                if let Some(rec) = st.queue.pop_front() {
                    return Ok(rec);
                }
            }
            self.shared.ready.notified().await;
        }
    }

    async fn commit(&self, offsets: &[CommitOffset]) -> Result<()> {
        let mut st = self.shared.state.lock().await;
        st.commit_calls += 1;
        if let Some(reason) = st.commit_error.take() {
            return Err(BridgeError::BrokerUnavailable(reason));
        }
        for o in offsets {
            st.committed.insert((o.topic.clone(), o.partition), o.offset);
        }
        Ok(())
    }

    async fn close(&self) {
        self.shared.state.lock().await.consumer_closed = true;
        self.shared.ready.notify_one();
    }
}
