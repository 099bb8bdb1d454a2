//! Broker consume loop with batched manual commits.
//!
//! One task per bridge pulls records, decodes them, hands them to a
//! [`RecordHandler`] and commits positions in batches. The commit cursor is
//! owned by that task alone.
//!
//! Commits are optimistic: a position is committed once its record has been
//! handed to the handler, not once the handler's downstream work is durable.
//! A crash before the commit redelivers; a crash after it loses any detached
//! work still in flight.

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};

use ragbridge_core::error::Result;

use crate::broker::{BrokerConsumer, BrokerRecord, CommitOffset, RawRecord};
use crate::config::BrokerSection;
use crate::obs::BridgeMetrics;

/// Callback invoked for every decoded record.
///
/// Errors are the handler's business: the loop only awaits it.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    async fn on_record(&self, record: BrokerRecord);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    /// The loop task ended on its own (broker error or panic).
    Crashed = 4,
}

impl LoopState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => LoopState::Starting,
            2 => LoopState::Running,
            3 => LoopState::Stopping,
            4 => LoopState::Crashed,
            _ => LoopState::Stopped,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoopState::Stopped => "stopped",
            LoopState::Starting => "starting",
            LoopState::Running => "running",
            LoopState::Stopping => "stopping",
            LoopState::Crashed => "crashed",
        }
    }
}

/// Shared, lock-free view of the loop state.
#[derive(Clone, Default)]
pub struct ConsumerStatus(Arc<AtomicU8>);

impl ConsumerStatus {
    pub fn get(&self) -> LoopState {
        LoopState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.get() == LoopState::Running
    }

    fn set(&self, state: LoopState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Compare-and-set; false if the state was not `from`.
    fn transition(&self, from: LoopState, next: LoopState) -> bool {
        self.0
            .compare_exchange(from as u8, next as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Flush thresholds: whichever is reached first.
#[derive(Debug, Clone, Copy)]
pub struct CommitPolicy {
    pub batch_size: usize,
    pub interval: Duration,
}

impl CommitPolicy {
    pub fn from_config(cfg: &BrokerSection) -> Self {
        Self {
            batch_size: cfg.commit_batch_size,
            interval: Duration::from_millis(cfg.commit_interval_ms),
        }
    }
}

/// Highest dispatched offset per partition since the last flush.
#[derive(Debug)]
pub struct CommitCursor {
    positions: BTreeMap<(String, i32), i64>,
    pending: usize,
    last_commit: Instant,
}

impl CommitCursor {
    pub fn new(now: Instant) -> Self {
        Self {
            positions: BTreeMap::new(),
            pending: 0,
            last_commit: now,
        }
    }

    /// Record that `offset` has been handed to the handler.
    pub fn advance(&mut self, topic: &str, partition: i32, offset: i64) {
        let pos = self
            .positions
            .entry((topic.to_string(), partition))
            .or_insert(offset);
        if offset > *pos {
            *pos = offset;
        }
        self.pending += 1;
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn is_due(&self, now: Instant, policy: &CommitPolicy) -> bool {
        self.pending > 0
            && (self.pending >= policy.batch_size
                || now.saturating_duration_since(self.last_commit) >= policy.interval)
    }

    /// Drain positions as broker commit offsets (next offset to read) and
    /// reset both thresholds.
    pub fn take(&mut self, now: Instant) -> Vec<CommitOffset> {
        self.pending = 0;
        self.last_commit = now;
        std::mem::take(&mut self.positions)
            .into_iter()
            .map(|((topic, partition), offset)| CommitOffset {
                topic,
                partition,
                offset: offset + 1,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub topic: String,
    pub poll_timeout: Duration,
    pub policy: CommitPolicy,
    pub stop_grace: Duration,
}

impl LoopSettings {
    pub fn from_config(cfg: &BrokerSection) -> Self {
        Self {
            topic: cfg.consume_topic.clone(),
            poll_timeout: Duration::from_millis(cfg.poll_timeout_ms),
            policy: CommitPolicy::from_config(cfg),
            stop_grace: Duration::from_millis(cfg.stop_grace_ms),
        }
    }
}

struct RunningLoop {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct ConsumerLoop {
    consumer: Arc<dyn BrokerConsumer>,
    handler: Arc<dyn RecordHandler>,
    settings: LoopSettings,
    metrics: Arc<BridgeMetrics>,
    status: ConsumerStatus,
    running: Mutex<Option<RunningLoop>>,
}

impl ConsumerLoop {
    pub fn new(
        consumer: Arc<dyn BrokerConsumer>,
        handler: Arc<dyn RecordHandler>,
        settings: LoopSettings,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            consumer,
            handler,
            settings,
            metrics,
            status: ConsumerStatus::default(),
            running: Mutex::new(None),
        }
    }

    pub fn status(&self) -> ConsumerStatus {
        self.status.clone()
    }

    /// Subscribe and spawn the loop task. A second call while started is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.running.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        self.status.set(LoopState::Starting);
        if let Err(e) = self.consumer.subscribe(&[self.settings.topic.as_str()]).await {
            self.status.set(LoopState::Stopped);
            return Err(e);
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = LoopWorker {
            consumer: Arc::clone(&self.consumer),
            handler: Arc::clone(&self.handler),
            metrics: Arc::clone(&self.metrics),
            poll_timeout: self.settings.poll_timeout,
            policy: self.settings.policy,
        };
        let status = self.status.clone();
        status.set(LoopState::Running);

        let topic = self.settings.topic.clone();
        let task = tokio::spawn(async move {
            match AssertUnwindSafe(worker.run(stop_rx)).catch_unwind().await {
                Ok(Ok(())) => tracing::info!(%topic, "consumer loop ended"),
                Ok(Err(e)) => {
                    tracing::error!(%topic, error = %e, "consumer loop crashed; consuming has stopped");
                    status.transition(LoopState::Running, LoopState::Crashed);
                }
                Err(_) => {
                    tracing::error!(%topic, "consumer loop panicked; consuming has stopped");
                    status.transition(LoopState::Running, LoopState::Crashed);
                }
            }
        });

        tracing::info!(topic = %self.settings.topic, "consumer loop started");
        *slot = Some(RunningLoop { stop_tx, task });
        Ok(())
    }

    /// Signal the loop, join it (aborting after the stop grace), then close
    /// the consumer. No commit is issued here.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };

        self.status.transition(LoopState::Running, LoopState::Stopping);
        let _ = running.stop_tx.send(true);

        let mut task = running.task;
        match timeout(self.settings.stop_grace, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "consumer loop task failed"),
            Err(_) => {
                tracing::warn!(
                    grace_ms = self.settings.stop_grace.as_millis() as u64,
                    "consumer loop did not stop in time; aborting"
                );
                task.abort();
                let _ = task.await;
            }
        }

        self.consumer.close().await;
        self.status.set(LoopState::Stopped);
        tracing::info!("consumer loop stopped");
    }
}

struct LoopWorker {
    consumer: Arc<dyn BrokerConsumer>,
    handler: Arc<dyn RecordHandler>,
    metrics: Arc<BridgeMetrics>,
    poll_timeout: Duration,
    policy: CommitPolicy,
}

impl LoopWorker {
    async fn run(self, mut stop_rx: watch::Receiver<bool>) -> Result<()> {
        let mut cursor = CommitCursor::new(Instant::now());

        loop {
            if *stop_rx.borrow() {
                return Ok(());
            }

            let polled = tokio::select! {
                biased;
                _ = stop_rx.changed() => return Ok(()),
                polled = timeout(self.poll_timeout, self.consumer.next_record()) => polled,
            };

            match polled {
                // idle tick; the interval threshold is still checked below
                Err(_) => {}
                Ok(Err(e)) => return Err(e),
                Ok(Ok(raw)) => self.process(raw, &mut cursor).await,
            }

            let now = Instant::now();
            if cursor.is_due(now, &self.policy) {
                let count = cursor.pending();
                let offsets = cursor.take(now);
                if let Err(e) = self.consumer.commit(&offsets).await {
                    self.metrics.commits.inc(&[("outcome", "error")]);
                    return Err(e);
                }
                self.metrics.commits.inc(&[("outcome", "ok")]);
                tracing::info!(records = count, partitions = offsets.len(), "batch commit");
            }
        }
    }

    async fn process(&self, raw: RawRecord, cursor: &mut CommitCursor) {
        let topic = raw.topic.clone();
        let (partition, offset) = (raw.partition, raw.offset);

        match BrokerRecord::decode(raw) {
            None => {
                self.metrics.records.inc(&[("outcome", "null_value")]);
                tracing::debug!(%topic, partition, offset, "skipping record without value");
            }
            Some(Err(e)) => {
                self.metrics.records.inc(&[("outcome", "malformed")]);
                tracing::warn!(%topic, partition, offset, error = %e, "discarding malformed record");
            }
            Some(Ok(record)) => {
                self.metrics.records.inc(&[("outcome", "dispatched")]);
                tracing::debug!(
                    %topic,
                    partition,
                    offset,
                    command = %record.envelope.command(),
                    "record received"
                );
                self.handler.on_record(record).await;
                cursor.advance(&topic, partition, offset);
            }
        }
    }
}
