//! HTTP surface: authorization and quota decisions as clients see them.

use std::collections::BTreeSet;

use reqwest::StatusCode;
use serde_json::{json, Value};

use kernel_gateway::lifecycle::LifecycleOrchestrator;

mod common;
use common::{test_config, FakeManagers};

async fn launch(client: &reqwest::Client, addr: std::net::SocketAddr, user: &str) -> reqwest::Response {
    client
        .post(format!("http://{}/api/kernels", addr))
        .json(&json!({ "env": { "KERNEL_USERNAME": user } }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_api_reports_server_settings() {
    let mut config = test_config();
    config.ws_ping_interval_secs = 0;
    let gateway = LifecycleOrchestrator::with_factory(config, FakeManagers::default())
        .initialize()
        .await
        .unwrap();
    let coordinator = gateway.coordinator();
    let (addr, task) = common::start(gateway).await;

    let body: Value = reqwest::get(format!("http://{}/api", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["settings"]["allow_remote_access"], true);
    assert_eq!(body["settings"]["ws_ping_interval_ms"], 0);

    let specs: Value = reqwest::get(format!("http://{}/api/kernelspecs", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(specs["default"], "python3");
    assert!(specs["kernelspecs"]["python3"].is_object());

    coordinator.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_denied_user_gets_forbidden() {
    let gateway = LifecycleOrchestrator::with_factory(test_config(), FakeManagers::default())
        .initialize()
        .await
        .unwrap();
    let coordinator = gateway.coordinator();
    let (addr, task) = common::start(gateway).await;
    let client = reqwest::Client::new();

    let response = launch(&client, addr, "root").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("not authorized"));

    assert_eq!(launch(&client, addr, "alice").await.status(), StatusCode::CREATED);

    coordinator.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_allow_list_restricts_users() {
    let mut config = test_config();
    config.authorized_users = BTreeSet::from(["alice".to_string()]);
    let gateway = LifecycleOrchestrator::with_factory(config, FakeManagers::default())
        .initialize()
        .await
        .unwrap();
    let coordinator = gateway.coordinator();
    let (addr, task) = common::start(gateway).await;
    let client = reqwest::Client::new();

    assert_eq!(launch(&client, addr, "alice").await.status(), StatusCode::CREATED);
    assert_eq!(launch(&client, addr, "mallory").await.status(), StatusCode::FORBIDDEN);

    coordinator.stop();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_per_user_quota() {
    let mut config = test_config();
    config.max_kernels_per_user = 2;
    let managers = FakeManagers::default();
    let gateway = LifecycleOrchestrator::with_factory(config, managers.clone())
        .initialize()
        .await
        .unwrap();
    let coordinator = gateway.coordinator();
    let (addr, task) = common::start(gateway).await;
    let client = reqwest::Client::new();

    let first: Value = launch(&client, addr, "bob").await.json().await.unwrap();
    assert_eq!(first["owner"], "bob");
    assert_eq!(launch(&client, addr, "bob").await.status(), StatusCode::CREATED);

    let third = launch(&client, addr, "bob").await;
    assert_eq!(third.status(), StatusCode::FORBIDDEN);
    let body: Value = third.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().starts_with("quota exceeded"));

    // Other users are counted separately.
    assert_eq!(launch(&client, addr, "carol").await.status(), StatusCode::CREATED);

    let kernels: Vec<Value> = client
        .get(format!("http://{}/api/kernels", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(kernels.len(), 3);

    // Releasing one of bob's kernels frees a slot.
    let id = first["id"].as_str().unwrap();
    let deleted = client
        .delete(format!("http://{}/api/kernels/{}", addr, id))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    assert_eq!(launch(&client, addr, "bob").await.status(), StatusCode::CREATED);

    let missing = client
        .get(format!("http://{}/api/kernels/{}", addr, id))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    coordinator.stop();
    task.await.unwrap().unwrap();
    assert_eq!(managers.launcher.terminated.lock().unwrap().len(), 4);
}
