//! Integration tests for gateway startup against a real listener.
//!
//! The listener and the two stores come up independently; these tests pin
//! down that neither store gates the listener and that a failed store only
//! shows up in readiness and logs.

mod common;

use std::time::Duration;

use common::*;
use gateway_core::kernel::{DocumentStore, ListenerState, StoreState};
use gateway_core::server::start_gateway;
use serde_json::{json, Value};

/// Port 1 refuses connections; the short timeout keeps the test fast
const UNREACHABLE_MONGO: &str =
    "mongodb://127.0.0.1:1/?serverSelectionTimeoutMS=200&connectTimeoutMS=200";

async fn get_json(url: String) -> (u16, Value) {
    let response = reqwest::get(&url).await.expect("request failed");
    let status = response.status().as_u16();
    (status, response.json().await.expect("body is not JSON"))
}

#[tokio::test]
async fn test_listener_does_not_wait_for_stores() {
    let harness = TestHarness::development();
    let components = harness
        .components()
        .with_document_store(FakeStore::mongo(FakeBehavior::Hang))
        .with_relational_store(FakeStore::postgres(FakeBehavior::Hang));

    let gateway = start_gateway(harness.config.clone(), components)
        .await
        .unwrap();
    let readiness = gateway.readiness();
    assert_eq!(
        readiness.listener(),
        ListenerState::Listening(gateway.address())
    );

    let (status, body) = get_json(format!("http://{}/__/health", gateway.address())).await;
    assert_eq!(status, 503);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["document_store"]["state"], "connecting");
    assert_eq!(body["relational_store"]["state"], "connecting");

    gateway.stop().await.unwrap();
    assert_eq!(readiness.listener(), ListenerState::Stopped);
}

#[tokio::test]
async fn test_unreachable_document_store_is_not_fatal() {
    let harness = TestHarness::development();
    let components = harness
        .components()
        .with_document_store(std::sync::Arc::new(DocumentStore::new(UNREACHABLE_MONGO)));

    let gateway = start_gateway(harness.config.clone(), components)
        .await
        .unwrap();
    let readiness = gateway.readiness();

    // Routed to REST while the document store is still trying
    let (status, body) = get_json(format!("http://{}/__/", gateway.address())).await;
    assert_eq!(status, 200);
    assert_eq!(body["mode"], "development");

    let document = tokio::time::timeout(Duration::from_secs(30), readiness.wait_for_document_store())
        .await
        .expect("document store never settled");
    assert!(matches!(document, StoreState::Failed(_)));
    assert!(matches!(readiness.listener(), ListenerState::Listening(_)));

    let (status, body) = get_json(format!("http://{}/__/health", gateway.address())).await;
    assert_eq!(status, 503);
    assert_eq!(body["document_store"]["state"], "failed");

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn test_health_ok_once_both_stores_connect() {
    let harness = TestHarness::development();
    let gateway = start_gateway(harness.config.clone(), harness.components())
        .await
        .unwrap();
    let readiness = gateway.readiness();

    assert_eq!(readiness.wait_for_document_store().await, StoreState::Connected);
    assert_eq!(readiness.wait_for_relational_store().await, StoreState::Connected);

    let (status, body) = get_json(format!("http://{}/__/health", gateway.address())).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["listener"]["state"], "listening");

    gateway.stop().await.unwrap();
}

#[tokio::test]
async fn test_relational_failure_leaves_graphql_serving() {
    let harness = TestHarness::development();
    let components = harness
        .components()
        .with_relational_store(FakeStore::postgres(FakeBehavior::Fail("password authentication failed")));

    let logs = LogBuffer::default();
    let _guard = logs.install();

    let gateway = start_gateway(harness.config.clone(), components)
        .await
        .unwrap();
    let readiness = gateway.readiness();
    assert!(matches!(
        readiness.wait_for_relational_store().await,
        StoreState::Failed(_)
    ));

    let response = reqwest::Client::new()
        .post(format!("http://{}/__/graphql", gateway.address()))
        .json(&json!({ "query": "{ apiVersion readiness { relationalStore { state error } } }" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["apiVersion"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["data"]["readiness"]["relationalStore"]["state"], "failed");
    assert!(body["data"]["readiness"]["relationalStore"]["error"]
        .as_str()
        .unwrap()
        .contains("password authentication failed"));

    let response = reqwest::Client::new()
        .get(format!("http://{}/__/graphql", gateway.address()))
        .query(&[("query", "{ apiVersion }")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["data"]["apiVersion"], env!("CARGO_PKG_VERSION"));

    gateway.stop().await.unwrap();

    let output = logs.contents();
    let failures: Vec<_> = output
        .lines()
        .filter(|line| line.contains("ERROR") && line.contains("Postgres"))
        .collect();
    assert_eq!(failures.len(), 1, "{output}");
}

#[tokio::test]
async fn test_bootstrap_log_lines() {
    let mut harness = TestHarness::development();
    harness.config.host = "0.0.0.0".to_string();

    let logs = LogBuffer::default();
    let _guard = logs.install();

    let gateway = start_gateway(harness.config.clone(), harness.components())
        .await
        .unwrap();
    let readiness = gateway.readiness();
    readiness.wait_for_document_store().await;
    readiness.wait_for_relational_store().await;

    let port = gateway.address().port();
    gateway.stop().await.unwrap();

    let output = logs.contents();
    assert!(output.contains("App: Bootstrap Succeeded."), "{output}");
    assert!(
        output.contains(&format!("Host: http://0.0.0.0:{port}/.")),
        "{output}"
    );
    assert!(output.contains("Mongo: Connection Succeeded."), "{output}");
    assert!(output.contains("Postgres: Connection Succeeded."), "{output}");
}

#[tokio::test]
async fn test_bind_failure_is_returned() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut harness = TestHarness::development();
    harness.config.port = occupied.local_addr().unwrap().port();

    let result = start_gateway(harness.config.clone(), harness.components()).await;
    let error = result.err().expect("bind should fail");
    assert!(error.to_string().contains("Failed to bind"));
}

#[tokio::test]
async fn test_run_until_stops_on_signal() {
    let harness = TestHarness::development();
    let gateway = start_gateway(harness.config.clone(), harness.components())
        .await
        .unwrap();
    let readiness = gateway.readiness();

    gateway.run_until(async {}).await.unwrap();
    assert_eq!(readiness.listener(), ListenerState::Stopped);
}
