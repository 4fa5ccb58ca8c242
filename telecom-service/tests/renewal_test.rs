//! Renewal integration tests for telecom-service.

mod common;

use common::{at, TestApp, TEST_CUSTOMER_ID};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use telecom_service::engines::renewal::SUSPEND_REASON_WALLET;
use telecom_service::error::TelecomError;
use telecom_service::models::{cycle_key, OrderStatus, PlanType, SubscriptionStatus, UsageReport};
use telecom_service::services::{OrderGateway, TelecomStore};

const MSISDN: &str = "+919111111111";

#[tokio::test]
async fn prepaid_renewal_with_failed_wallet_check_suspends() {
    let app = TestApp::spawn().await;
    let subscription = app
        .provision_line(MSISDN, PlanType::Prepaid, at(2026, 1, 15))
        .await;
    app.wallet.set(false);

    let outcome = app
        .state
        .renewals
        .renew(subscription.subscription_id, at(2026, 2, 15))
        .await
        .unwrap();

    let prepaid = outcome.prepaid.unwrap();
    assert!(!prepaid.wallet_check_passed);
    assert!(prepaid.should_suspend);
    assert!(outcome.postpaid.is_none());
    assert_eq!(outcome.status, SubscriptionStatus::Suspended);
    assert_eq!(outcome.renewal_date, at(2026, 2, 15));
    assert!(outcome.usage_counter_id.is_none());

    let stored = app
        .store
        .get_subscription(subscription.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Suspended);
    assert_eq!(stored.renewal_date, at(2026, 2, 15));

    let suspended = app.sink.named("telecom.subscription.suspended");
    assert_eq!(suspended.len(), 1);
    assert_eq!(suspended[0]["reason"], SUSPEND_REASON_WALLET);
    assert_eq!(suspended[0]["customer_id"], TEST_CUSTOMER_ID);
}

#[tokio::test]
async fn repeated_wallet_failure_does_not_notify_again() {
    let app = TestApp::spawn().await;
    let subscription = app
        .provision_line(MSISDN, PlanType::Prepaid, at(2026, 1, 15))
        .await;
    app.wallet.set(false);

    for day in [15, 16] {
        let outcome = app
            .state
            .renewals
            .renew(subscription.subscription_id, at(2026, 2, day))
            .await
            .unwrap();
        assert_eq!(outcome.status, SubscriptionStatus::Suspended);
    }

    assert_eq!(app.sink.named("telecom.subscription.suspended").len(), 1);
}

#[tokio::test]
async fn prepaid_renewal_starts_a_fresh_cycle() {
    let app = TestApp::spawn().await;
    let subscription = app
        .provision_line(MSISDN, PlanType::Prepaid, at(2026, 1, 15))
        .await;
    app.state
        .meter
        .record_usage(&[UsageReport {
            msisdn: MSISDN.to_string(),
            data_mb: 1200.0,
            voice_min: 45.0,
        }])
        .await;

    let outcome = app
        .state
        .renewals
        .renew(subscription.subscription_id, at(2026, 2, 15))
        .await
        .unwrap();

    assert!(outcome.prepaid.unwrap().wallet_check_passed);
    assert_eq!(outcome.status, SubscriptionStatus::Active);
    assert_eq!(outcome.renewal_date, at(2026, 3, 15));

    let renewed = app
        .store
        .get_subscription(subscription.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renewed.current_period_start, at(2026, 2, 15));
    assert_eq!(renewed.renewal_date, at(2026, 3, 15));

    let history = app.store.usage_history(subscription.subscription_id).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].cycle, "2026-01");
    assert_eq!(history[0].data_used_mb, 1200.0);
    assert_eq!(history[1].cycle, "2026-02");
    assert_eq!(history[1].data_used_mb, 0.0);
    assert_eq!(outcome.usage_counter_id, Some(history[1].counter_id));
}

#[tokio::test]
async fn renewal_lifts_a_quota_bar() {
    let app = TestApp::spawn().await;
    let subscription = app
        .provision_line(MSISDN, PlanType::Prepaid, at(2026, 1, 15))
        .await;
    app.state
        .meter
        .record_usage(&[UsageReport {
            msisdn: MSISDN.to_string(),
            data_mb: 42000.0,
            voice_min: 0.0,
        }])
        .await;

    let outcome = app
        .state
        .renewals
        .renew(subscription.subscription_id, at(2026, 2, 15))
        .await
        .unwrap();

    assert_eq!(outcome.status, SubscriptionStatus::Active);
    let counter = app
        .store
        .get_usage_counter(subscription.subscription_id, &cycle_key(at(2026, 2, 15)))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(counter.alerts_fired, 0);
}

#[tokio::test]
async fn postpaid_renewal_creates_draft_order_and_invoice() {
    let app = TestApp::spawn().await;
    let subscription = app
        .provision_line(MSISDN, PlanType::Postpaid, at(2026, 1, 15))
        .await;

    let outcome = app
        .state
        .renewals
        .renew(subscription.subscription_id, at(2026, 2, 15))
        .await
        .unwrap();

    let postpaid = outcome.postpaid.unwrap();
    assert!(postpaid.draft_order_id.starts_with("draft_"));
    assert_eq!(postpaid.amount, Decimal::new(29900, 2));
    assert_eq!(postpaid.currency_code, "inr");
    assert!(postpaid.invoice_sent);
    assert!(outcome.prepaid.is_none());
    assert_eq!(outcome.renewal_date, at(2026, 3, 15));
    assert!(outcome.usage_counter_id.is_some());

    let draft = app
        .store
        .get_order(&postpaid.draft_order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(draft.status, OrderStatus::Draft);
    assert_eq!(draft.customer_id, TEST_CUSTOMER_ID);
    assert_eq!(draft.items.len(), 1);
    assert_eq!(draft.items[0].title, format!("Renewal - {}", MSISDN));
    assert_eq!(draft.items[0].unit_price, Decimal::new(29900, 2));

    let invoices = app.sink.named("telecom.invoice.issued");
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0]["order_id"], postpaid.draft_order_id.as_str());
}

#[tokio::test]
async fn retried_postpaid_renewal_reuses_its_draft_order() {
    let app = TestApp::spawn().await;
    let subscription = app
        .provision_line(MSISDN, PlanType::Postpaid, at(2026, 1, 15))
        .await;
    app.store.fail_next("apply_renewal").await;

    let err = app
        .state
        .renewals
        .renew(subscription.subscription_id, at(2026, 2, 15))
        .await
        .unwrap_err();
    assert!(matches!(err, TelecomError::Persistence(_)));
    let unchanged = app
        .store
        .get_subscription(subscription.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged.renewal_date, at(2026, 2, 15));

    let outcome = app
        .state
        .renewals
        .renew(subscription.subscription_id, at(2026, 2, 16))
        .await
        .unwrap();
    assert_eq!(outcome.renewal_date, at(2026, 3, 15));

    let invoices = app.sink.named("telecom.invoice.issued");
    assert_eq!(invoices.len(), 2);
    assert_eq!(invoices[0]["order_id"], invoices[1]["order_id"]);
    assert_eq!(
        invoices[1]["order_id"],
        outcome.postpaid.unwrap().draft_order_id.as_str()
    );
}

#[tokio::test]
async fn renewal_before_the_due_date_is_refused() {
    let app = TestApp::spawn().await;
    let subscription = app
        .provision_line(MSISDN, PlanType::Postpaid, at(2026, 1, 10))
        .await;

    let err = app
        .state
        .renewals
        .renew(subscription.subscription_id, at(2026, 1, 12))
        .await
        .unwrap_err();
    assert!(matches!(err, TelecomError::RenewalNotDue(date) if date == at(2026, 2, 10)));

    app.state
        .renewals
        .renew(subscription.subscription_id, at(2026, 2, 10))
        .await
        .unwrap();
    let again = app
        .state
        .renewals
        .renew(subscription.subscription_id, at(2026, 2, 10))
        .await
        .unwrap_err();
    assert!(matches!(again, TelecomError::RenewalNotDue(_)));

    let stored = app
        .store
        .get_subscription(subscription.subscription_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.renewal_date, at(2026, 3, 10));
    assert_eq!(app.sink.named("telecom.invoice.issued").len(), 1);
}

#[tokio::test]
async fn renew_endpoint_rejects_a_line_that_is_not_due() {
    let app = TestApp::spawn().await;
    let subscription = app
        .provision_line(MSISDN, PlanType::Postpaid, at(2099, 1, 10))
        .await;

    let response = app
        .post_empty(&format!(
            "/subscriptions/{}/renew",
            subscription.subscription_id
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.sink.named("telecom.invoice.issued").is_empty());
}

#[tokio::test]
async fn postpaid_renewal_survives_notification_failure() {
    let app = TestApp::spawn().await;
    let subscription = app
        .provision_line(MSISDN, PlanType::Postpaid, at(2026, 1, 15))
        .await;
    app.sink.fail();

    let outcome = app
        .state
        .renewals
        .renew(subscription.subscription_id, at(2026, 2, 15))
        .await
        .unwrap();

    assert!(!outcome.postpaid.unwrap().invoice_sent);
    assert_eq!(outcome.status, SubscriptionStatus::Active);
    assert_eq!(outcome.renewal_date, at(2026, 3, 15));
}

#[tokio::test]
async fn month_end_renewal_clamps_to_shorter_month() {
    let app = TestApp::spawn().await;
    let subscription = app
        .provision_line(MSISDN, PlanType::Postpaid, at(2026, 1, 31))
        .await;
    assert_eq!(subscription.renewal_date, at(2026, 2, 28));

    let outcome = app
        .state
        .renewals
        .renew(subscription.subscription_id, at(2026, 2, 28))
        .await
        .unwrap();

    assert_eq!(outcome.renewal_date, at(2026, 3, 28));
}

#[tokio::test]
async fn cancelled_subscription_cannot_renew() {
    let app = TestApp::spawn().await;
    let subscription = app
        .provision_line(MSISDN, PlanType::Prepaid, at(2026, 1, 15))
        .await;
    app.state
        .admin
        .cancel(subscription.subscription_id, None, true)
        .await
        .unwrap();

    let err = app
        .state
        .renewals
        .renew(subscription.subscription_id, at(2026, 2, 15))
        .await
        .unwrap_err();
    assert!(matches!(err, TelecomError::AlreadyCancelled));

    let response = app
        .post_empty(&format!(
            "/subscriptions/{}/renew",
            subscription.subscription_id
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
