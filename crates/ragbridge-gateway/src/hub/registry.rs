use std::collections::HashMap;
use std::sync::Arc;

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};

use ragbridge_core::error::{BridgeError, Result};

use crate::hub::transport::Transport;
use crate::obs::BridgeMetrics;

/// One live client connection. Owned by the hub registry.
pub struct Connection {
    id: String,
    role: String,
    transport: Arc<dyn Transport>,
}

impl Connection {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> &str {
        &self.role
    }
}

/// Outcome of one broadcast call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub matched: usize,
    pub delivered: usize,
    /// Ids whose send failed; each was dropped from the registry.
    pub failed: Vec<String>,
}

/// Registry of live connections with predicate-filtered fan-out.
///
/// - `registry` guards the id -> connection map (connect/disconnect/snapshot).
/// - `gate` serialises broadcasts so each connection sees them in call order.
pub struct ConnectionHub {
    registry: Mutex<HashMap<String, Arc<Connection>>>,
    gate: Mutex<()>,
    send_timeout: Duration,
    metrics: Arc<BridgeMetrics>,
}

impl ConnectionHub {
    pub fn new(send_timeout: Duration, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            gate: Mutex::new(()),
            send_timeout,
            metrics,
        }
    }

    /// Register a connection. An existing connection with the same id is
    /// closed and replaced.
    pub async fn connect(
        &self,
        id: impl Into<String>,
        transport: Arc<dyn Transport>,
        role: impl Into<String>,
    ) -> Arc<Connection> {
        let conn = Arc::new(Connection {
            id: id.into(),
            role: role.into(),
            transport,
        });

        let mut reg = self.registry.lock().await;
        if let Some(old) = reg.insert(conn.id.clone(), Arc::clone(&conn)) {
            tracing::warn!(id = %conn.id, "duplicate connection id; closing the previous connection");
            old.transport.close().await;
        }
        self.metrics.hub_connections.set(&[], reg.len() as i64);
        tracing::info!(id = %conn.id, role = %conn.role, "connection registered");
        conn
    }

    /// Remove by id. Unknown ids are a no-op.
    pub async fn disconnect(&self, id: &str) -> bool {
        let mut reg = self.registry.lock().await;
        let removed = reg.remove(id).is_some();
        self.metrics.hub_connections.set(&[], reg.len() as i64);
        removed
    }

    /// Remove `conn` only if the registry still holds that exact connection.
    pub async fn release(&self, conn: &Arc<Connection>) -> bool {
        let mut reg = self.registry.lock().await;
        let removed = remove_same(&mut reg, conn);
        if removed {
            self.metrics.hub_connections.set(&[], reg.len() as i64);
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.registry.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.registry.lock().await.is_empty()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.registry.lock().await.contains_key(id)
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.registry.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Send `message` to every connection matching `predicate`.
    ///
    /// A failed send drops that connection and never stops delivery to the
    /// others.
    pub async fn broadcast<P>(&self, message: &Value, predicate: P) -> Result<BroadcastReport>
    where
        P: Fn(&Connection) -> bool + Send,
    {
        let text = serde_json::to_string(message)
            .map_err(|e| BridgeError::Internal(format!("broadcast encode failed: {e}")))?;

        let _gate = self.gate.lock().await;

        let targets: Vec<Arc<Connection>> = {
            let reg = self.registry.lock().await;
            reg.values().filter(|c| predicate(c)).cloned().collect()
        };

        let mut report = BroadcastReport {
            matched: targets.len(),
            ..BroadcastReport::default()
        };
        if targets.is_empty() {
            return Ok(report);
        }

        let send_timeout = self.send_timeout;
        let text = text.as_str();
        let mut futs = FuturesUnordered::new();
        for conn in targets {
            futs.push(async move {
                let res = match timeout(send_timeout, conn.transport.send_text(text)).await {
                    Ok(r) => r,
                    Err(_) => Err(BridgeError::SendFailure("send timed out".into())),
                };
                (conn, res)
            });
        }

        let mut failed = Vec::new();
        while let Some((conn, res)) = futs.next().await {
            match res {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(id = %conn.id, error = %e, "send failed; dropping connection");
                    failed.push(conn);
                }
            }
        }
        drop(futs);

        if !failed.is_empty() {
            let mut reg = self.registry.lock().await;
            for conn in &failed {
                remove_same(&mut reg, conn);
            }
            self.metrics.hub_connections.set(&[], reg.len() as i64);
        }
        for conn in failed {
            conn.transport.close().await;
            report.failed.push(conn.id.clone());
        }

        self.metrics
            .broadcast_sends
            .add(&[("outcome", "ok")], report.delivered as u64);
        self.metrics
            .broadcast_sends
            .add(&[("outcome", "failed")], report.failed.len() as u64);
        Ok(report)
    }
}

fn remove_same(reg: &mut HashMap<String, Arc<Connection>>, conn: &Arc<Connection>) -> bool {
    match reg.get(&conn.id) {
        Some(current) if Arc::ptr_eq(current, conn) => {
            reg.remove(&conn.id);
            true
        }
        _ => false,
    }
}
