#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use ragbridge_core::protocol::Envelope;
use ragbridge_gateway::broker::memory::MemoryBroker;
use ragbridge_gateway::broker::{BrokerConsumer, BrokerRecord, ProducerPort};
use ragbridge_gateway::obs::BridgeMetrics;

use common::TOPIC;

fn envelope(command: &str, body: &str) -> Envelope {
    Envelope::new(command, BTreeMap::new(), body).unwrap()
}

#[tokio::test]
async fn send_reaches_subscribed_consumer() {
    let broker = MemoryBroker::new();
    let consumer = broker.consumer();
    consumer.subscribe(&[TOPIC]).await.unwrap();

    let metrics = Arc::new(BridgeMetrics::default());
    let port = ProducerPort::new(Arc::new(broker.producer()), Arc::clone(&metrics));
    let env = envelope("query-by-rag", r#"{"query":"q"}"#).with_header("client-id", "c7");
    port.send(TOPIC, Some("c7"), &env).await.unwrap();

    let raw = tokio::time::timeout(Duration::from_secs(1), consumer.next_record())
        .await
        .expect("record within a second")
        .unwrap();
    let rec = BrokerRecord::decode(raw).expect("has value").unwrap();
    assert_eq!(rec.key.as_deref(), Some("c7"));
    assert_eq!(rec.envelope, env);
    assert_eq!(
        metrics.produced.get(&[("topic", TOPIC), ("outcome", "ok")]),
        1
    );
}

#[test]
fn send_without_scheduler_is_refused() {
    let broker = MemoryBroker::new();
    let port = ProducerPort::new(
        Arc::new(broker.producer()),
        Arc::new(BridgeMetrics::default()),
    );
    assert!(!port.has_scheduler());

    let err = port
        .send_from_any_thread(TOPIC, None, envelope("pipeline-start", "doc.txt"))
        .expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "INTERNAL");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn send_from_plain_thread_is_delivered() {
    let broker = MemoryBroker::new();
    let consumer = broker.consumer();
    consumer.subscribe(&[TOPIC]).await.unwrap();

    let port = ProducerPort::new(
        Arc::new(broker.producer()),
        Arc::new(BridgeMetrics::default()),
    )
    .with_scheduler(Handle::current());

    let sender = port.clone();
    std::thread::spawn(move || {
        sender.send_from_any_thread(TOPIC, Some("k"), envelope("pipeline-start", "doc.txt"))
    })
    .join()
    .unwrap()
    .unwrap();

    let raw = tokio::time::timeout(Duration::from_secs(2), consumer.next_record())
        .await
        .expect("record within two seconds")
        .unwrap();
    let rec = BrokerRecord::decode(raw).unwrap().unwrap();
    assert_eq!(rec.envelope.command(), "pipeline-start");
    assert_eq!(rec.envelope.body(), "doc.txt");
}

#[tokio::test]
async fn closed_producer_reports_send_failure() {
    let broker = MemoryBroker::new();
    let port = ProducerPort::new(
        Arc::new(broker.producer()),
        Arc::new(BridgeMetrics::default()),
    );
    port.close().await;
    assert!(broker.is_producer_closed().await);

    let err = port
        .send(TOPIC, None, &envelope("pipeline-start", "doc.txt"))
        .await
        .expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BROKER_UNAVAILABLE");
}
