//! Broker frame codec (JSON).
//!
//! Record values are JSON objects shaped `{command, headers, body}`.
//! Header values are normalised to strings on the way in, since producers
//! outside this workspace may send numbers, booleans, or raw bytes.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};
use crate::protocol::envelope::Envelope;

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    headers: Option<Map<String, Value>>,
    #[serde(default)]
    body: Value,
}

/// Decode a broker record value into an [`Envelope`].
pub fn decode(raw: impl AsRef<[u8]>) -> Result<Envelope> {
    let value: Value = serde_json::from_slice(raw.as_ref())
        .map_err(|e| BridgeError::MalformedFrame(format!("invalid frame json: {e}")))?;
    if !value.is_object() {
        return Err(BridgeError::MalformedFrame(format!(
            "frame must be an object, got {}",
            json_kind(&value)
        )));
    }
    let frame: RawFrame = serde_json::from_value(value)
        .map_err(|e| BridgeError::MalformedFrame(format!("invalid frame fields: {e}")))?;

    let command = frame
        .command
        .ok_or_else(|| BridgeError::MalformedFrame("missing command".into()))?;

    let headers = frame
        .headers
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, header_value_to_string(v)))
        .collect();

    let body = match frame.body {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => {
            return Err(BridgeError::MalformedFrame(format!(
                "body must be a string, got {}",
                json_kind(&other)
            )))
        }
    };

    Envelope::new(command, headers, body)
}

/// Encode the three envelope fields. Fails on an empty command.
pub fn encode(
    command: &str,
    headers: &BTreeMap<String, String>,
    body: &str,
) -> Result<Vec<u8>> {
    let env = Envelope::new(command, headers.clone(), body)?;
    to_bytes(&env)
}

/// Encode an already validated envelope.
pub fn to_bytes(env: &Envelope) -> Result<Vec<u8>> {
    serde_json::to_vec(env).map_err(|e| BridgeError::Internal(format!("frame encode failed: {e}")))
}

/// Normalise a broker-level byte header to a string.
pub fn normalize_header_value(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn header_value_to_string(v: Value) -> String {
    match v {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
