use serde::Deserialize;
use ragbridge_core::error::{BridgeError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    pub broker: BrokerSection,

    #[serde(default)]
    pub hub: HubSection,

    #[serde(default)]
    pub workers: WorkerSection,

    #[serde(default)]
    pub rag: RagSection,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(BridgeError::BadRequest(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.gateway.validate()?;
        self.broker.validate()?;
        self.hub.validate()?;
        self.workers.validate()?;
        self.rag.validate()?;

        Ok(())
    }

    /// Environment overrides for deployment-specific broker settings.
    ///
    /// `KAFKA_TOPIC` sets both the consume and produce topic.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("KAFKA_BOOTSTRAP_SERVERS") {
            self.broker.bootstrap_servers = v;
        }
        if let Some(v) = lookup("KAFKA_TOPIC") {
            self.broker.consume_topic = v.clone();
            self.broker.produce_topic = v;
        }
        if let Some(v) = lookup("KAFKA_CONSUMER_GROUP") {
            self.broker.group_id = v;
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(BridgeError::BadRequest(
                "gateway.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(BridgeError::BadRequest(
                "gateway.idle_timeout_ms must be between 10000 and 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(BridgeError::BadRequest(
                "gateway.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}

/// Which broker backend the bridge talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerKind {
    Kafka,
    /// In-process loopback, for local runs without a cluster.
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    Earliest,
    Latest,
}

impl OffsetReset {
    pub fn as_str(self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerSection {
    pub kind: BrokerKind,

    #[serde(default)]
    pub bootstrap_servers: String,

    #[serde(default = "default_group_id")]
    pub group_id: String,

    #[serde(default = "default_topic")]
    pub consume_topic: String,

    #[serde(default = "default_topic")]
    pub produce_topic: String,

    #[serde(default = "default_offset_reset")]
    pub auto_offset_reset: OffsetReset,

    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    #[serde(default = "default_commit_batch_size")]
    pub commit_batch_size: usize,

    #[serde(default = "default_commit_interval_ms")]
    pub commit_interval_ms: u64,

    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,

    #[serde(default = "default_linger_ms")]
    pub linger_ms: u64,

    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

impl BrokerSection {
    pub fn validate(&self) -> Result<()> {
        if self.kind == BrokerKind::Kafka && self.bootstrap_servers.trim().is_empty() {
            return Err(BridgeError::BadRequest(
                "broker.bootstrap_servers is required for kind=kafka".into(),
            ));
        }
        if self.group_id.trim().is_empty() {
            return Err(BridgeError::BadRequest("broker.group_id must not be empty".into()));
        }
        if self.consume_topic.trim().is_empty() || self.produce_topic.trim().is_empty() {
            return Err(BridgeError::BadRequest("broker topics must not be empty".into()));
        }
        if !(1..=1000).contains(&self.commit_batch_size) {
            return Err(BridgeError::BadRequest(
                "broker.commit_batch_size must be between 1 and 1000".into(),
            ));
        }
        if !(100..=600000).contains(&self.commit_interval_ms) {
            return Err(BridgeError::BadRequest(
                "broker.commit_interval_ms must be between 100 and 600000".into(),
            ));
        }
        if !(10..=60000).contains(&self.poll_timeout_ms) {
            return Err(BridgeError::BadRequest(
                "broker.poll_timeout_ms must be between 10 and 60000".into(),
            ));
        }
        if self.heartbeat_interval_ms >= self.session_timeout_ms {
            return Err(BridgeError::BadRequest(
                "broker.heartbeat_interval_ms must be lower than session_timeout_ms".into(),
            ));
        }
        if self.send_timeout_ms == 0 || self.connect_timeout_ms == 0 {
            return Err(BridgeError::BadRequest(
                "broker send/connect timeouts must be positive".into(),
            ));
        }
        if !(100..=600000).contains(&self.stop_grace_ms) {
            return Err(BridgeError::BadRequest(
                "broker.stop_grace_ms must be between 100 and 600000".into(),
            ));
        }
        Ok(())
    }
}

fn default_group_id() -> String {
    "group-01".into()
}
fn default_topic() -> String {
    "rag_ingestion_start".into()
}
fn default_offset_reset() -> OffsetReset {
    OffsetReset::Latest
}
fn default_poll_timeout_ms() -> u64 {
    1000
}
fn default_commit_batch_size() -> usize {
    10
}
fn default_commit_interval_ms() -> u64 {
    5000
}
fn default_session_timeout_ms() -> u64 {
    30000
}
fn default_heartbeat_interval_ms() -> u64 {
    3000
}
fn default_max_poll_interval_ms() -> u64 {
    300000
}
fn default_linger_ms() -> u64 {
    5
}
fn default_send_timeout_ms() -> u64 {
    30000
}
fn default_connect_timeout_ms() -> u64 {
    10000
}
fn default_stop_grace_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubSection {
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    #[serde(default = "default_hub_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            outbound_queue: default_outbound_queue(),
            send_timeout_ms: default_hub_send_timeout_ms(),
        }
    }
}

impl HubSection {
    pub fn validate(&self) -> Result<()> {
        if self.outbound_queue == 0 {
            return Err(BridgeError::BadRequest("hub.outbound_queue must be positive".into()));
        }
        if !(1..=60000).contains(&self.send_timeout_ms) {
            return Err(BridgeError::BadRequest(
                "hub.send_timeout_ms must be between 1 and 60000".into(),
            ));
        }
        Ok(())
    }
}

fn default_outbound_queue() -> usize {
    1024
}
fn default_hub_send_timeout_ms() -> u64 {
    1500
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerSection {
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: default_shutdown_grace_ms(),
        }
    }
}

impl WorkerSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=600000).contains(&self.shutdown_grace_ms) {
            return Err(BridgeError::BadRequest(
                "workers.shutdown_grace_ms must be between 1 and 600000".into(),
            ));
        }
        Ok(())
    }
}

fn default_shutdown_grace_ms() -> u64 {
    10000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RagSection {
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    #[serde(default = "default_embed_model")]
    pub embed_model: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for RagSection {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            default_top_k: default_top_k(),
            ollama_url: default_ollama_url(),
            embed_model: default_embed_model(),
            llm_model: default_llm_model(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl RagSection {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size < 50 {
            return Err(BridgeError::BadRequest("rag.chunk_size must be at least 50".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(BridgeError::BadRequest(
                "rag.chunk_overlap must be smaller than chunk_size".into(),
            ));
        }
        if !(1..=100).contains(&self.default_top_k) {
            return Err(BridgeError::BadRequest(
                "rag.default_top_k must be between 1 and 100".into(),
            ));
        }
        Ok(())
    }
}

fn default_source_dir() -> String {
    "/mnt".into()
}
fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_top_k() -> usize {
    3
}
fn default_ollama_url() -> String {
    "http://localhost:11434".into()
}
fn default_embed_model() -> String {
    "nomic-embed-text".into()
}
fn default_llm_model() -> String {
    "llama3.1".into()
}
fn default_request_timeout_ms() -> u64 {
    60000
}
