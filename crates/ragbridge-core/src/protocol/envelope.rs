use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{BridgeError, Result};

/// Decoded command/headers/body unit exchanged over the broker.
///
/// Immutable once built; the only way in is [`Envelope::new`], which rejects
/// an empty (or whitespace-only) command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    command: String,
    headers: BTreeMap<String, String>,
    body: String,
}

impl Envelope {
    pub fn new(
        command: impl Into<String>,
        headers: BTreeMap<String, String>,
        body: impl Into<String>,
    ) -> Result<Self> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(BridgeError::MalformedFrame("missing command".into()));
        }
        Ok(Self {
            command,
            headers,
            body: body.into(),
        })
    }

    /// Command as sent (case preserved).
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Lower-cased command, the dispatch key.
    pub fn command_key(&self) -> String {
        self.command.trim().to_ascii_lowercase()
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Copy with one header added or replaced.
    pub fn with_header(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.headers.insert(key.into(), value.into());
        next
    }
}
