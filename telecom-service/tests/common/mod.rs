//! Test helper module for telecom-service integration tests.
//!
//! Every test gets its own in-memory store, a recording notification sink and
//! a wallet whose answer the test controls.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use telecom_service::config::TelecomConfig;
use telecom_service::error::TelecomError;
use telecom_service::models::{
    CreatePlan, LineItem, NewPhoneNumber, NumberTier, Order, OrderStatus, PlanConfiguration,
    PlanType, ReservationFilter, Subscription,
};
use telecom_service::services::{
    InMemoryStore, NotificationSink, OrderGateway, TelecomStore, WalletGateway,
};
use telecom_service::startup::{AppState, Application, Collaborators};
use uuid::Uuid;

pub const TEST_CUSTOMER_ID: &str = "cus_01HTELECOMTEST";
pub const TEST_REGION: &str = "IN-MH";
pub const TEST_PRODUCT_ID: &str = "prod_hero_299";
pub const TEST_QUOTA_MB: i64 = 42000;

/// Fixed clock for engine-level tests.
pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 10, 0, 0).unwrap()
}

/// Notification sink that keeps every event it is handed.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, Value)>>,
    failing: AtomicBool,
}

impl RecordingSink {
    /// Make every following publish fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().unwrap().clone()
    }

    pub fn named(&self, event: &str) -> Vec<Value> {
        self.events()
            .into_iter()
            .filter(|(name, _)| name == event)
            .map(|(_, data)| data)
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn publish(&self, event: &'static str, data: Value) -> Result<(), TelecomError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TelecomError::Gateway(anyhow::anyhow!("sink offline")));
        }
        self.events.lock().unwrap().push((event.to_string(), data));
        Ok(())
    }
}

/// Wallet that answers whatever the test last set. Approves by default.
pub struct ScriptedWallet {
    approve: AtomicBool,
}

impl Default for ScriptedWallet {
    fn default() -> Self {
        Self {
            approve: AtomicBool::new(true),
        }
    }
}

impl ScriptedWallet {
    pub fn set(&self, approve: bool) {
        self.approve.store(approve, Ordering::SeqCst);
    }
}

#[async_trait]
impl WalletGateway for ScriptedWallet {
    async fn check_balance(
        &self,
        _customer_id: &str,
        _subscription_id: Uuid,
        _amount: Decimal,
    ) -> Result<bool, TelecomError> {
        Ok(self.approve.load(Ordering::SeqCst))
    }
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
    pub store: Arc<InMemoryStore>,
    pub sink: Arc<RecordingSink>,
    pub wallet: Arc<ScriptedWallet>,
    pub state: AppState,
}

impl TestApp {
    /// Spawn a new test application on a random port.
    pub async fn spawn() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(RecordingSink::default());
        let wallet = Arc::new(ScriptedWallet::default());

        let app = Application::build_with(
            TelecomConfig::in_memory(),
            Collaborators {
                store: store.clone(),
                orders: store.clone(),
                notifier: sink.clone(),
                wallet: wallet.clone(),
            },
        )
        .await
        .expect("Failed to build test application");

        let port = app.port();
        let state = app.state().clone();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        }

        TestApp {
            address,
            port,
            client,
            store,
            sink,
            wallet,
            state,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_empty(&self, path: &str) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn seed_plan(&self, product_id: &str, plan_type: PlanType) -> PlanConfiguration {
        self.store
            .insert_plan(&CreatePlan {
                product_id: product_id.to_string(),
                plan_type,
                data_quota_mb: TEST_QUOTA_MB,
                voice_quota_min: 3000,
                contract_months: 0,
                is_5g: true,
            })
            .await
            .expect("Failed to seed plan")
    }

    pub async fn seed_numbers(&self, numbers: &[&str]) {
        for phone_number in numbers {
            self.store
                .insert_phone_number(&NewPhoneNumber {
                    phone_number: phone_number.to_string(),
                    tier: NumberTier::Standard,
                    region_code: TEST_REGION.to_string(),
                })
                .await
                .expect("Failed to seed number");
        }
    }

    /// Reserve a specific number the way checkout does.
    pub async fn reserve(&self, phone_number: &str) {
        self.state
            .inventory
            .reserve_number(&ReservationFilter {
                specific_number: Some(phone_number.to_string()),
                ..Default::default()
            })
            .await
            .expect("Failed to reserve number");
    }

    pub async fn place_order(&self, order_id: &str, items: Vec<LineItem>) {
        self.store
            .upsert_order(&Order {
                order_id: order_id.to_string(),
                customer_id: TEST_CUSTOMER_ID.to_string(),
                currency_code: "inr".to_string(),
                status: OrderStatus::Placed,
                items,
            })
            .await
            .expect("Failed to store order");
    }

    /// Seed, reserve and provision one line; returns its subscription.
    pub async fn provision_line(
        &self,
        phone_number: &str,
        plan_type: PlanType,
        now: DateTime<Utc>,
    ) -> Subscription {
        let product_id = format!("prod_{}_{}", plan_type.as_str(), phone_number);
        self.seed_plan(&product_id, plan_type).await;
        self.seed_numbers(&[phone_number]).await;
        self.reserve(phone_number).await;

        let order_id = format!("order_{}", Uuid::new_v4().simple());
        self.place_order(
            &order_id,
            vec![plan_item("item_1", &product_id, phone_number)],
        )
        .await;

        let result = self
            .state
            .provisioning
            .run(&order_id, now)
            .await
            .expect("Failed to provision line");
        let line = result.subscriptions.first().expect("No line provisioned");

        self.store
            .get_subscription(line.subscription_id)
            .await
            .unwrap()
            .expect("Provisioned subscription missing")
    }
}

/// Line item carrying a reserved number.
pub fn plan_item(line_item_id: &str, product_id: &str, phone_number: &str) -> LineItem {
    LineItem {
        line_item_id: line_item_id.to_string(),
        product_id: product_id.to_string(),
        variant_id: None,
        title: "Hero 299".to_string(),
        quantity: 1,
        unit_price: Decimal::new(29900, 2),
        metadata: json!({ "allocated_number": phone_number }),
    }
}

/// Line item without a number (SIM card, accessory).
pub fn plain_item(line_item_id: &str, product_id: &str) -> LineItem {
    LineItem {
        line_item_id: line_item_id.to_string(),
        product_id: product_id.to_string(),
        variant_id: None,
        title: "SIM card".to_string(),
        quantity: 1,
        unit_price: Decimal::ZERO,
        metadata: json!({}),
    }
}
