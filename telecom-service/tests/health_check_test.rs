//! Health, metrics and routing integration tests for telecom-service.

mod common;

use common::TestApp;
use reqwest::StatusCode;
use uuid::Uuid;

#[tokio::test]
async fn health_check_works() {
    let app = TestApp::spawn().await;

    let response = app.get("/health").await;

    assert!(response.status().is_success());

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "telecom-service");
}

#[tokio::test]
async fn readiness_check_works() {
    let app = TestApp::spawn().await;

    let response = app.get("/ready").await;

    assert!(response.status().is_success());
}

#[tokio::test]
async fn health_check_reports_unavailable_store() {
    let app = TestApp::spawn().await;
    app.store.fail_next("health_check").await;

    let response = app.get("/health").await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "unhealthy");
}

#[tokio::test]
async fn metrics_endpoint_works() {
    let app = TestApp::spawn().await;
    app.seed_numbers(&["+919111111111"]).await;
    app.reserve("+919111111111").await;

    let response = app.get("/metrics").await;

    assert!(response.status().is_success());
    let body = response.text().await.unwrap();
    assert!(body.contains("telecom_number_operations_total"));
}

#[tokio::test]
async fn responses_carry_request_id() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/health"))
        .header("x-request-id", "req-telecom-1")
        .send()
        .await
        .unwrap();

    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-telecom-1"
    );
}

#[tokio::test]
async fn unknown_subscription_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app.get(&format!("/subscriptions/{}", Uuid::new_v4())).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Subscription not found");
}

#[tokio::test]
async fn malformed_subscription_id_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app.get("/subscriptions/not-a-uuid").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
