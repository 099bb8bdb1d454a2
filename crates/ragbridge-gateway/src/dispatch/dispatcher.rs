use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::FutureExt;
use serde_json::{json, Value};

use ragbridge_core::error::{BridgeError, Result};

use crate::broker::{BrokerRecord, RecordHandler};
use crate::dispatch::tasks::TaskRegistry;
use crate::hub::{Connection, ConnectionHub};
use crate::obs::BridgeMetrics;

/// Envelope header naming the connection a result is meant for.
pub const CLIENT_ID_HEADER: &str = "client-id";

/// How the consume loop waits on a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Awaited by the loop before it polls again.
    Inline,
    /// Handed to the task registry; the loop moves on immediately.
    Detached,
}

/// Handler for one broker command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Lower-case command name this handler serves.
    fn command(&self) -> &'static str;
    fn mode(&self) -> DispatchMode;
    /// `Some(value)` is broadcast as `{"value": value}`.
    async fn handle(&self, record: BrokerRecord) -> Result<Option<Value>>;
}

/// Command table plus the result path back to clients.
pub struct CommandDispatcher {
    handlers: DashMap<&'static str, Arc<dyn CommandHandler>>,
    hub: Arc<ConnectionHub>,
    tasks: Arc<TaskRegistry>,
    metrics: Arc<BridgeMetrics>,
}

impl CommandDispatcher {
    pub fn new(hub: Arc<ConnectionHub>, tasks: Arc<TaskRegistry>, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            handlers: DashMap::new(),
            hub,
            tasks,
            metrics,
        }
    }

    pub fn register(&self, handler: Arc<dyn CommandHandler>) {
        self.handlers.insert(handler.command(), handler);
    }

    pub fn registered_commands(&self) -> Vec<&'static str> {
        let mut cmds: Vec<&'static str> = self.handlers.iter().map(|e| *e.key()).collect();
        cmds.sort_unstable();
        cmds
    }

    /// Route one record by its lower-cased command.
    ///
    /// Inline handlers are awaited and their result broadcast here. Detached
    /// handlers are spawned and `Ok(None)` is returned at once; their result
    /// or failure is broadcast when they finish.
    pub async fn dispatch(&self, record: BrokerRecord) -> Result<Option<Value>> {
        let key = record.envelope.command_key();
        let handler = self
            .handlers
            .get(key.as_str())
            .ok_or_else(|| BridgeError::UnknownCommand(record.envelope.command().to_string()))?
            .value()
            .clone();

        let audience = Audience::of(&record);
        match handler.mode() {
            DispatchMode::Inline => {
                let value = run_handler(&*handler, record, &self.metrics).await?;
                if let Some(v) = &value {
                    publish(&self.hub, &audience, &json!({ "value": v })).await;
                }
                Ok(value)
            }
            DispatchMode::Detached => {
                let hub = Arc::clone(&self.hub);
                let metrics = Arc::clone(&self.metrics);
                let command = handler.command();
                self.tasks
                    .spawn(command, async move {
                        match run_handler(&*handler, record, &metrics).await {
                            Ok(Some(v)) => publish(&hub, &audience, &json!({ "value": v })).await,
                            Ok(None) => {}
                            Err(e) => report_failure(&hub, &metrics, &audience, command, &e).await,
                        }
                    })
                    .await;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl RecordHandler for CommandDispatcher {
    async fn on_record(&self, record: BrokerRecord) {
        let audience = Audience::of(&record);
        let command = record.envelope.command_key();
        if let Err(e) = self.dispatch(record).await {
            report_failure(&self.hub, &self.metrics, &audience, &command, &e).await;
        }
    }
}

/// Who receives a result: one connection if the envelope names it, else all.
#[derive(Debug, Clone)]
struct Audience {
    client_id: Option<String>,
}

impl Audience {
    fn of(record: &BrokerRecord) -> Self {
        Self {
            client_id: record
                .envelope
                .header(CLIENT_ID_HEADER)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        }
    }

    fn matches(&self, conn: &Connection) -> bool {
        self.client_id.as_deref().map_or(true, |id| conn.id() == id)
    }
}

async fn run_handler(
    handler: &dyn CommandHandler,
    record: BrokerRecord,
    metrics: &BridgeMetrics,
) -> Result<Option<Value>> {
    let started = Instant::now();
    // a panicking handler fails its own record, never the consume loop
    let res = match AssertUnwindSafe(handler.handle(record)).catch_unwind().await {
        Ok(res) => res,
        Err(_) => {
            tracing::error!(command = handler.command(), "handler panicked");
            Err(BridgeError::HandlerFailure(format!(
                "{} handler panicked",
                handler.command()
            )))
        }
    };
    metrics
        .dispatch_duration
        .observe(&[("command", handler.command())], started.elapsed());
    res
}

async fn publish(hub: &ConnectionHub, audience: &Audience, message: &Value) {
    match hub.broadcast(message, |c| audience.matches(c)).await {
        Ok(report) => tracing::debug!(
            matched = report.matched,
            delivered = report.delivered,
            failed = report.failed.len(),
            "result broadcast"
        ),
        Err(e) => tracing::warn!(error = %e, "result broadcast failed"),
    }
}

async fn report_failure(
    hub: &ConnectionHub,
    metrics: &BridgeMetrics,
    audience: &Audience,
    command: &str,
    err: &BridgeError,
) {
    let code = err.client_code().as_str();
    metrics
        .dispatch_errors
        .inc(&[("command", command), ("code", code)]);
    tracing::warn!(%command, code, error = %err, "dispatch failed");

    let message = json!({
        "value": {
            "answer": err.public_message(),
            "hits": [],
            "error": code,
        }
    });
    publish(hub, audience, &message).await;
}
