#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde_json::Value;

use ragbridge_core::error::{BridgeError, Result};
use ragbridge_core::protocol::{frame, Envelope};
use ragbridge_gateway::broker::{BrokerRecord, RecordHandler};
use ragbridge_gateway::collab::{Embedder, LlmProvider};
use ragbridge_gateway::hub::Transport;

pub const TOPIC: &str = "rag_ingestion_start";

/// Transport that records every message, optionally failing every send.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<String>>,
    fail: AtomicBool,
    closed: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        let t = Self::default();
        t.fail.store(true, Ordering::SeqCst);
        Arc::new(t)
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<Value> {
        self.texts()
            .iter()
            .map(|t| serde_json::from_str(t).unwrap())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_text(&self, text: &str) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BridgeError::SendFailure("socket gone".into()));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Record handler that keeps what it was given.
#[derive(Default)]
pub struct CollectingHandler {
    records: Mutex<Vec<BrokerRecord>>,
    delay: Option<Duration>,
}

impl CollectingHandler {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            delay: Some(delay),
        }
    }

    pub fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn commands(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.envelope.command().to_string())
            .collect()
    }
}

#[async_trait]
impl RecordHandler for CollectingHandler {
    async fn on_record(&self, record: BrokerRecord) {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.records.lock().unwrap().push(record);
    }
}

/// Deterministic embedder: counts of a few marker words.
#[derive(Default)]
pub struct KeywordEmbedder {
    pub calls: AtomicUsize,
}

const MARKERS: [&str; 4] = ["rust", "kafka", "tokio", "python"];

impl Embedder for KeywordEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                MARKERS
                    .iter()
                    .map(|m| lower.matches(m).count() as f32 + 0.01)
                    .collect()
            })
            .collect())
    }
}

/// LLM that echoes a short digest of its prompt.
#[derive(Default)]
pub struct EchoLlm {
    pub prompts: Mutex<Vec<(String, Option<String>)>>,
}

impl LlmProvider for EchoLlm {
    fn invoke(&self, prompt: &str, model: Option<&str>) -> Result<String> {
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), model.map(str::to_string)));
        Ok(format!("answer from {} chars", prompt.len()))
    }
}

pub struct FailingLlm;

impl LlmProvider for FailingLlm {
    fn invoke(&self, _prompt: &str, _model: Option<&str>) -> Result<String> {
        Err(BridgeError::HandlerFailure("model backend exploded at 10.0.0.7".into()))
    }
}

pub fn frame_bytes(command: &str, headers: &[(&str, &str)], body: &str) -> Vec<u8> {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    frame::encode(command, &headers, body).unwrap()
}

pub fn record(command: &str, headers: &[(&str, &str)], body: &str) -> BrokerRecord {
    let headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    BrokerRecord {
        topic: TOPIC.to_string(),
        partition: 0,
        offset: 0,
        key: None,
        envelope: Envelope::new(command, headers, body).unwrap(),
        headers: BTreeMap::new(),
        timestamp: None,
        consumed_at: SystemTime::now(),
    }
}

/// Poll `check` until it holds or `limit` elapses.
pub async fn eventually<F: Fn() -> bool>(limit: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
