//! Integration tests for the admin API endpoints.

use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::json;
use std::sync::Arc;

use permalog_api::{create_router, AppState};
use permalog_core::{NewQueueEntry, Operation, Visibility};
use permalog_gateway::{Gateway, GatewayResult, TxStatus};
use permalog_publisher::{Alerter, PublisherConfig, PublisherService};
use permalog_store::{MemoryStore, QueueStore};
use permalog_wallet::Wallet;

/// Gateway stub that accepts every upload and reports posted
/// transactions as pending.
struct OkGateway;

#[async_trait]
impl Gateway for OkGateway {
    async fn post_transaction(&self, _id: &str, _body: &[u8]) -> GatewayResult<()> {
        Ok(())
    }

    async fn tx_status(&self, _id: &str) -> GatewayResult<TxStatus> {
        Ok(TxStatus::Pending)
    }

    async fn balance_winston(&self, _address: &str) -> GatewayResult<u128> {
        // 10 AR
        Ok(10 * 1_000_000_000_000)
    }

    async fn price_winston(&self, bytes: usize) -> GatewayResult<u128> {
        Ok(bytes as u128)
    }
}

fn create_test_service(store: Arc<MemoryStore>) -> Arc<PublisherService> {
    let config = PublisherConfig {
        bundle_size_threshold: 1,
        ..PublisherConfig::default()
    };
    Arc::new(PublisherService::new(
        config,
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        Arc::new(Wallet::from_secret_bytes(&[9u8; 32])),
        Arc::new(OkGateway),
        Arc::new(Alerter::new()),
    ))
}

fn create_test_server(secret: Option<&str>) -> (TestServer, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(
        create_test_service(store.clone()),
        secret.map(|s| s.to_string()),
    );
    (TestServer::new(create_router(state)).unwrap(), store)
}

#[tokio::test]
async fn test_health_is_public() {
    let (server, _) = create_test_server(Some("s3cret"));

    let response = server.get("/").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "permalog");
    assert_eq!(body["chain"]["seq"], 0);
    assert_eq!(body["queue"]["total"], 0);
    assert_eq!(body["wallet"]["status"], "ok");
    assert_eq!(body["config"]["max_retries"], 5);
}

#[tokio::test]
async fn test_trigger_requires_bearer_secret() {
    let (server, _) = create_test_server(Some("s3cret"));

    server.post("/trigger").await.assert_status_unauthorized();

    let response = server
        .post("/trigger")
        .authorization_bearer("wrong")
        .await;
    response.assert_status_unauthorized();

    let response = server
        .post("/trigger")
        .authorization_bearer("s3cret")
        .await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_trigger_processes_queued_rows() {
    let (server, store) = create_test_server(None);

    store.put_manifest("C1", br#"{"ver": 1}"#.to_vec()).await;
    store
        .insert(NewQueueEntry::new("E1", "C1", Operation::Update, Visibility::Public))
        .await
        .unwrap();

    let response = server.post("/trigger").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["processed"], 1);
    assert_eq!(body["succeeded"], 1);

    // The health surface reflects the advanced chain and last batch.
    let health: serde_json::Value = server.get("/").await.json();
    assert_eq!(health["chain"]["seq"], 1);
    assert_eq!(health["last_batch"]["succeeded"], 1);
}

#[tokio::test]
async fn test_test_bundle_round_trip() {
    let (server, _) = create_test_server(None);

    let response = server.post("/test-bundle?count=2").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["count"], 2);
    assert_eq!(body["record_ids"].as_array().unwrap().len(), 2);

    // The production chain is untouched; the bundle is tracked.
    let health: serde_json::Value = server.get("/").await.json();
    assert_eq!(health["chain"]["seq"], 0);
    assert_eq!(health["verification"]["pending_bundles"], 1);
}

#[tokio::test]
async fn test_test_bundle_count_validated() {
    let (server, _) = create_test_server(None);
    server
        .post("/test-bundle?count=0")
        .await
        .assert_status_bad_request();
    server
        .post("/test-bundle?count=101")
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn test_test_verify_inject_and_inspect() {
    let (server, _) = create_test_server(None);

    let response = server
        .post("/test-verify")
        .json(&json!({
            "bundle_tx": "B-inject",
            "item_count": 2,
            "age_secs": 0
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["bundle"]["bundle_tx"], "B-inject");
    assert_eq!(body["bundle"]["item_count"], 2);

    let listing: serde_json::Value = server.get("/test-verify").await.json();
    assert_eq!(listing["counters"]["pending_bundles"], 1);
    assert_eq!(listing["bundles"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_test_verify_rejects_bad_item_count() {
    let (server, _) = create_test_server(None);
    server
        .post("/test-verify")
        .json(&json!({"item_count": 0}))
        .await
        .assert_status_bad_request();
}
