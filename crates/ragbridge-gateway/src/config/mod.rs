//! Bridge config loader (strict parsing).

pub mod schema;

use std::fs;

use ragbridge_core::error::{BridgeError, Result};

pub use schema::{
    BridgeConfig, BrokerKind, BrokerSection, GatewaySection, HubSection, OffsetReset,
    RagSection, WorkerSection,
};

/// Load from disk, apply `KAFKA_*` environment overrides, then validate.
pub fn load_from_file(path: &str) -> Result<BridgeConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| BridgeError::Internal(format!("read config failed ({path}): {e}")))?;
    let mut cfg = parse(&s)?;
    cfg.apply_overrides(|k| std::env::var(k).ok());
    cfg.validate()?;
    Ok(cfg)
}

pub fn load_from_str(s: &str) -> Result<BridgeConfig> {
    let cfg = parse(s)?;
    cfg.validate()?;
    Ok(cfg)
}

fn parse(s: &str) -> Result<BridgeConfig> {
    serde_yaml::from_str(s).map_err(|e| BridgeError::BadRequest(format!("invalid yaml: {e}")))
}
