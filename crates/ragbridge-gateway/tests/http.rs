#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use ragbridge_gateway::app_state::{AppState, Collaborators};
use ragbridge_gateway::broker::memory::MemoryBroker;
use ragbridge_gateway::collab::{MemoryParentStore, MemoryVectorStore};
use ragbridge_gateway::{config, router};

use common::{eventually, EchoLlm, KeywordEmbedder, RecordingTransport};

async fn serve() -> (SocketAddr, AppState) {
    // same order as the binary: listener before the bridge
    let listener = router::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let cfg = config::load_from_str("version: 1\nbroker:\n  kind: memory\n  poll_timeout_ms: 50\n")
        .unwrap();
    let broker = MemoryBroker::new();
    let collab = Collaborators {
        embedder: Arc::new(KeywordEmbedder::default()),
        llm: Arc::new(EchoLlm::default()),
        vectors: Arc::new(MemoryVectorStore::new()),
        parents: Arc::new(MemoryParentStore::new()),
    };
    let state = AppState::with_parts(
        cfg,
        Arc::new(broker.producer()),
        Arc::new(broker.consumer()),
        collab,
    )
    .await
    .unwrap();

    let app = router::build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

#[tokio::test]
async fn healthz_and_readyz_follow_the_bridge() {
    let (addr, state) = serve().await;
    let http = reqwest::Client::new();

    let res = http.get(format!("http://{addr}/healthz")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "ok");

    let res = http.get(format!("http://{addr}/readyz")).send().await.unwrap();
    assert_eq!(res.status(), 200);

    state.shutdown().await;

    let res = http.get(format!("http://{addr}/readyz")).send().await.unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(res.text().await.unwrap(), "stopped");

    // liveness does not depend on the bridge
    let res = http.get(format!("http://{addr}/healthz")).send().await.unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn posted_command_is_published_and_dispatched() {
    let (addr, state) = serve().await;
    let client = RecordingTransport::new();
    state.hub().connect("c9", client.clone(), "viewer").await;

    let res = reqwest::Client::new()
        .post(format!("http://{addr}/v1/commands"))
        .json(&json!({
            "command": "query-by-rag",
            "headers": {"client-id": "c9"},
            "body": "{\"query\": \"tokio?\"}",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 202);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({"accepted": true, "command": "query-by-rag"}));

    assert!(eventually(Duration::from_secs(5), || client.texts().len() == 1).await);
    let msgs = client.messages();
    assert_eq!(msgs[0]["value"]["hits"], json!([]));

    state.shutdown().await;
}

#[tokio::test]
async fn malformed_command_requests_are_rejected() {
    let (addr, state) = serve().await;
    let http = reqwest::Client::new();

    let res = http
        .post(format!("http://{addr}/v1/commands"))
        .json(&json!({"command": "  ", "body": "x"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "MALFORMED_FRAME");

    let res = http
        .post(format!("http://{addr}/v1/commands"))
        .json(&json!({"command": "pipeline-start", "bogus": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    state.shutdown().await;
}

#[tokio::test]
async fn metrics_expose_consumer_state_and_counters() {
    let (addr, state) = serve().await;

    let text = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains("ragbridge_consumer_state 2"));

    state.shutdown().await;
}

#[tokio::test]
async fn bind_reports_a_taken_port() {
    let (addr, state) = serve().await;

    let err = router::bind(addr).await.expect_err("port in use");
    assert_eq!(err.client_code().as_str(), "INTERNAL");
    // the running server is unaffected
    let res = reqwest::get(format!("http://{addr}/healthz")).await.unwrap();
    assert_eq!(res.status(), 200);

    state.shutdown().await;
}
