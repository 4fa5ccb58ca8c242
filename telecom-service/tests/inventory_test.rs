//! Number pool integration tests for telecom-service.

mod common;

use common::{at, TestApp, TEST_REGION};
use reqwest::StatusCode;
use serde_json::{json, Value};
use telecom_service::models::{NumberStatus, PlanType, ReservationFilter, SubscriptionStatus};
use telecom_service::services::TelecomStore;

#[tokio::test]
async fn add_numbers_returns_created_pool_entries() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json(
            "/numbers",
            &json!({
                "numbers": [
                    { "phone_number": "+919111111111", "region_code": "IN-MH" },
                    { "phone_number": "+919111111112", "region_code": "IN-KA", "tier": "gold" }
                ]
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.unwrap();
    let numbers = body["numbers"].as_array().unwrap();
    assert_eq!(numbers.len(), 2);
    assert_eq!(numbers[0]["status"], "available");
    assert_eq!(numbers[0]["tier"], "standard");
    assert_eq!(numbers[1]["tier"], "gold");
}

#[tokio::test]
async fn duplicate_number_conflicts() {
    let app = TestApp::spawn().await;
    app.seed_numbers(&["+919111111111"]).await;

    let response = app
        .post_json(
            "/numbers",
            &json!({ "numbers": [{ "phone_number": "+919111111111", "region_code": "IN-MH" }] }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn add_numbers_validates_region() {
    let app = TestApp::spawn().await;

    let response = app
        .post_json(
            "/numbers",
            &json!({ "numbers": [{ "phone_number": "+919111111111", "region_code": "" }] }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(app
        .store
        .find_phone_number("+919111111111")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn reserve_takes_first_matching_number() {
    let app = TestApp::spawn().await;
    app.seed_numbers(&["+919111111111", "+919111111112"]).await;

    let response = app
        .post_json("/numbers/reserve", &json!({ "region_code": TEST_REGION }))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["phone_number"], "+919111111111");
    assert_eq!(body["status"], "reserved");

    let second: Value = app
        .post_json("/numbers/reserve", &json!({ "region_code": TEST_REGION }))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(second["phone_number"], "+919111111112");
}

#[tokio::test]
async fn reserve_with_exhausted_pool_conflicts() {
    let app = TestApp::spawn().await;
    app.seed_numbers(&["+919111111111"]).await;

    let response = app
        .post_json("/numbers/reserve", &json!({ "region_code": "IN-DL" }))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    app.reserve("+919111111111").await;
    let response = app
        .post_json(
            "/numbers/reserve",
            &json!({ "specific_number": "+919111111111" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Number +919111111111 is not available");
}

#[tokio::test]
async fn concurrent_reservations_never_share_a_number() {
    let app = TestApp::spawn().await;
    app.seed_numbers(&["+919111111111", "+919111111112", "+919111111113"])
        .await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let inventory = app.state.inventory.clone();
        handles.push(tokio::spawn(async move {
            inventory
                .reserve_number(&ReservationFilter::default())
                .await
                .ok()
                .map(|n| n.phone_number)
        }));
    }

    let mut reserved = Vec::new();
    for handle in handles {
        if let Some(phone_number) = handle.await.unwrap() {
            reserved.push(phone_number);
        }
    }
    reserved.sort();
    reserved.dedup();

    assert_eq!(reserved.len(), 3);
}

#[tokio::test]
async fn release_returns_number_to_pool() {
    let app = TestApp::spawn().await;
    app.seed_numbers(&["+919111111111"]).await;
    app.reserve("+919111111111").await;
    let number = app
        .store
        .find_phone_number("+919111111111")
        .await
        .unwrap()
        .unwrap();

    let response = app
        .post_empty(&format!("/numbers/{}/release", number.number_id))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let number = app
        .store
        .get_phone_number(number.number_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(number.status, NumberStatus::Available);
    assert!(number.subscription_id.is_none());
}

#[tokio::test]
async fn release_refuses_number_held_by_open_subscription() {
    let app = TestApp::spawn().await;
    let subscription = app
        .provision_line("+919111111111", PlanType::Prepaid, at(2026, 1, 10))
        .await;

    let response = app
        .post_empty(&format!("/numbers/{}/release", subscription.number_id))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let number = app
        .store
        .get_phone_number(subscription.number_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(number.status, NumberStatus::Active);
    assert_eq!(number.subscription_id, Some(subscription.subscription_id));
    let line = app
        .store
        .get_subscription(subscription.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(line.status, SubscriptionStatus::Active);
}

#[tokio::test]
async fn release_is_allowed_once_the_line_is_cancelled() {
    let app = TestApp::spawn().await;
    let subscription = app
        .provision_line("+919111111111", PlanType::Postpaid, at(2026, 1, 10))
        .await;
    app.state
        .admin
        .cancel(subscription.subscription_id, None, true)
        .await
        .unwrap();

    let response = app
        .post_empty(&format!("/numbers/{}/release", subscription.number_id))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn list_numbers_filters_by_status() {
    let app = TestApp::spawn().await;
    app.seed_numbers(&["+919111111111", "+919111111112"]).await;
    app.reserve("+919111111112").await;

    let body: Value = app
        .get("/numbers?status=reserved")
        .await
        .json()
        .await
        .unwrap();

    let numbers = body["numbers"].as_array().unwrap();
    assert_eq!(numbers.len(), 1);
    assert_eq!(numbers[0]["phone_number"], "+919111111112");
}
