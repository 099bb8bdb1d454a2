#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use ragbridge_core::error::{BridgeError, Result};
use ragbridge_gateway::broker::memory::MemoryBroker;
use ragbridge_gateway::broker::{
    BrokerRecord, CommitPolicy, ConsumerLoop, LoopSettings, LoopState, RecordHandler,
};
use ragbridge_gateway::dispatch::{CommandDispatcher, CommandHandler, DispatchMode, TaskRegistry};
use ragbridge_gateway::hub::ConnectionHub;
use ragbridge_gateway::obs::BridgeMetrics;

use common::{eventually, frame_bytes, record, RecordingTransport, TOPIC};

/// Echoes the body back, optionally waiting for a release signal.
struct EchoHandler {
    name: &'static str,
    mode: DispatchMode,
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl CommandHandler for EchoHandler {
    fn command(&self) -> &'static str {
        self.name
    }

    fn mode(&self) -> DispatchMode {
        self.mode
    }

    async fn handle(&self, record: BrokerRecord) -> Result<Option<Value>> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(Some(json!({ "echo": record.envelope.body() })))
    }
}

struct FailingHandler;

#[async_trait]
impl CommandHandler for FailingHandler {
    fn command(&self) -> &'static str {
        "explode"
    }

    fn mode(&self) -> DispatchMode {
        DispatchMode::Inline
    }

    async fn handle(&self, _record: BrokerRecord) -> Result<Option<Value>> {
        Err(BridgeError::HandlerFailure(
            "vector store at 10.0.0.7:6333 refused connection".into(),
        ))
    }
}

/// Indexes past the end of an empty buffer.
struct PanickingHandler;

#[async_trait]
impl CommandHandler for PanickingHandler {
    fn command(&self) -> &'static str {
        "boom"
    }

    fn mode(&self) -> DispatchMode {
        DispatchMode::Inline
    }

    async fn handle(&self, record: BrokerRecord) -> Result<Option<Value>> {
        let bytes = record.envelope.body().as_bytes();
        Ok(Some(json!({ "byte": bytes[bytes.len() + 3] })))
    }
}

struct Fixture {
    hub: Arc<ConnectionHub>,
    tasks: Arc<TaskRegistry>,
    dispatcher: Arc<CommandDispatcher>,
    metrics: Arc<BridgeMetrics>,
}

fn fixture() -> Fixture {
    let metrics = Arc::new(BridgeMetrics::default());
    let hub = Arc::new(ConnectionHub::new(
        Duration::from_millis(200),
        Arc::clone(&metrics),
    ));
    let tasks = Arc::new(TaskRegistry::new(Arc::clone(&metrics)));
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::clone(&hub),
        Arc::clone(&tasks),
        Arc::clone(&metrics),
    ));
    dispatcher.register(Arc::new(EchoHandler {
        name: "echo",
        mode: DispatchMode::Inline,
        gate: None,
    }));
    dispatcher.register(Arc::new(FailingHandler));
    dispatcher.register(Arc::new(PanickingHandler));
    Fixture {
        hub,
        tasks,
        dispatcher,
        metrics,
    }
}

#[tokio::test]
async fn unknown_command_is_rejected() {
    let fx = fixture();
    let err = fx
        .dispatcher
        .dispatch(record("no-such-command", &[], "x"))
        .await
        .expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "UNKNOWN_COMMAND");
}

#[tokio::test]
async fn command_lookup_is_case_insensitive() {
    let fx = fixture();
    let out = fx.dispatcher.dispatch(record("ECHO", &[], "hi")).await.unwrap();
    assert_eq!(out, Some(json!({"echo": "hi"})));
    assert_eq!(fx.dispatcher.registered_commands(), vec!["boom", "echo", "explode"]);
}

#[tokio::test]
async fn inline_result_is_broadcast_as_value() {
    let fx = fixture();
    let t = RecordingTransport::new();
    fx.hub.connect("c1", t.clone(), "viewer").await;

    fx.dispatcher.dispatch(record("echo", &[], "hello")).await.unwrap();

    assert_eq!(t.messages(), vec![json!({"value": {"echo": "hello"}})]);
}

#[tokio::test]
async fn client_id_header_targets_one_connection() {
    let fx = fixture();
    let a = RecordingTransport::new();
    let b = RecordingTransport::new();
    fx.hub.connect("a", a.clone(), "viewer").await;
    fx.hub.connect("b", b.clone(), "viewer").await;

    fx.dispatcher
        .dispatch(record("echo", &[("client-id", "b")], "only b"))
        .await
        .unwrap();

    assert!(a.texts().is_empty());
    assert_eq!(b.messages(), vec![json!({"value": {"echo": "only b"}})]);
}

#[tokio::test]
async fn detached_handler_returns_before_it_finishes() {
    let fx = fixture();
    let gate = Arc::new(Notify::new());
    fx.dispatcher.register(Arc::new(EchoHandler {
        name: "slow",
        mode: DispatchMode::Detached,
        gate: Some(Arc::clone(&gate)),
    }));
    let t = RecordingTransport::new();
    fx.hub.connect("c1", t.clone(), "viewer").await;

    let out = fx.dispatcher.dispatch(record("slow", &[], "later")).await.unwrap();
    assert_eq!(out, None);
    assert!(t.texts().is_empty());
    assert_eq!(fx.tasks.len().await, 1);
    assert_eq!(fx.metrics.detached_tasks.get(&[]), 1);

    gate.notify_one();
    assert!(eventually(Duration::from_secs(2), || !t.texts().is_empty()).await);
    assert_eq!(t.messages(), vec![json!({"value": {"echo": "later"}})]);

    assert_eq!(fx.tasks.shutdown(Duration::from_secs(1)).await, 0);
}

#[tokio::test]
async fn shutdown_aborts_detached_work_past_grace() {
    let fx = fixture();
    fx.dispatcher.register(Arc::new(EchoHandler {
        name: "stuck",
        mode: DispatchMode::Detached,
        gate: Some(Arc::new(Notify::new())),
    }));
    fx.dispatcher.dispatch(record("stuck", &[], "")).await.unwrap();

    assert_eq!(fx.metrics.detached_tasks.get(&[]), 1);
    assert_eq!(fx.tasks.shutdown(Duration::from_millis(50)).await, 1);
    assert!(fx.tasks.is_empty().await);
    assert_eq!(fx.metrics.detached_tasks.get(&[]), 0);
}

#[tokio::test]
async fn handler_failure_broadcasts_generic_error() {
    let fx = fixture();
    let t = RecordingTransport::new();
    fx.hub.connect("c1", t.clone(), "viewer").await;

    fx.dispatcher.on_record(record("explode", &[], "")).await;

    let msgs = t.messages();
    assert_eq!(msgs.len(), 1);
    let value = &msgs[0]["value"];
    assert_eq!(value["error"], "HANDLER_FAILURE");
    assert_eq!(value["hits"], json!([]));
    let answer = value["answer"].as_str().unwrap();
    assert!(!answer.is_empty());
    assert!(!answer.contains("10.0.0.7"));
    assert_eq!(
        fx.metrics
            .dispatch_errors
            .get(&[("command", "explode"), ("code", "HANDLER_FAILURE")]),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn loop_survives_unknown_command_and_keeps_dispatching() {
    let fx = fixture();
    let t = RecordingTransport::new();
    fx.hub.connect("c1", t.clone(), "viewer").await;

    let broker = MemoryBroker::new();
    let lp = ConsumerLoop::new(
        Arc::new(broker.consumer()),
        fx.dispatcher.clone(),
        LoopSettings {
            topic: TOPIC.to_string(),
            poll_timeout: Duration::from_millis(1000),
            policy: CommitPolicy {
                batch_size: 10,
                interval: Duration::from_secs(5),
            },
            stop_grace: Duration::from_millis(500),
        },
        Arc::clone(&fx.metrics),
    );
    lp.start().await.unwrap();

    broker
        .publish_raw(TOPIC, None, Some(frame_bytes("bogus", &[], "")), vec![])
        .await;
    broker
        .publish_raw(TOPIC, None, Some(frame_bytes("echo", &[], "after")), vec![])
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let msgs = t.messages();
    assert_eq!(msgs.len(), 2);
    assert_eq!(msgs[0]["value"]["error"], "UNKNOWN_COMMAND");
    assert_eq!(msgs[1], json!({"value": {"echo": "after"}}));
    assert_eq!(lp.status().get(), LoopState::Running);

    lp.stop().await;
}

#[tokio::test]
async fn inline_panic_becomes_handler_failure() {
    let fx = fixture();
    let err = fx
        .dispatcher
        .dispatch(record("boom", &[], ""))
        .await
        .expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "HANDLER_FAILURE");
    assert!(!err.public_message().contains("panicked"));
}

#[tokio::test(start_paused = true)]
async fn loop_keeps_running_after_inline_handler_panics() {
    let fx = fixture();
    let t = RecordingTransport::new();
    fx.hub.connect("c1", t.clone(), "viewer").await;

    let broker = MemoryBroker::new();
    let lp = ConsumerLoop::new(
        Arc::new(broker.consumer()),
        fx.dispatcher.clone(),
        LoopSettings {
            topic: TOPIC.to_string(),
            poll_timeout: Duration::from_millis(1000),
            policy: CommitPolicy {
                batch_size: 2,
                interval: Duration::from_secs(5),
            },
            stop_grace: Duration::from_millis(500),
        },
        Arc::clone(&fx.metrics),
    );
    lp.start().await.unwrap();

    broker
        .publish_raw(TOPIC, None, Some(frame_bytes("boom", &[], "")), vec![])
        .await;
    broker
        .publish_raw(TOPIC, None, Some(frame_bytes("echo", &[], "still here")), vec![])
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let msgs = t.messages();
    assert_eq!(msgs.len(), 2);
    assert_eq!(msgs[0]["value"]["error"], "HANDLER_FAILURE");
    assert_eq!(msgs[1], json!({"value": {"echo": "still here"}}));
    assert_eq!(lp.status().get(), LoopState::Running);
    // both records were handed over, so the batch of two committed
    assert_eq!(broker.committed(TOPIC, 0).await, Some(2));

    lp.stop().await;
}
