//! Outbound lifecycle notifications.
//!
//! Engines call one method per event kind. Each sink only has to implement
//! [`NotificationSink::publish`], which receives the event name and its JSON
//! payload.

use crate::error::TelecomError;
use crate::models::UsageThreshold;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

pub const EVENT_SUBSCRIPTION_CANCELLED: &str = "telecom.subscription.cancelled";
pub const EVENT_SUBSCRIPTION_SUSPENDED: &str = "telecom.subscription.suspended";
pub const EVENT_INVOICE_ISSUED: &str = "telecom.invoice.issued";

/// Quota alert for one subscription in one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct UsageAlert {
    pub subscription_id: Uuid,
    pub customer_id: String,
    pub phone_number: String,
    pub cycle: String,
    pub threshold: UsageThreshold,
    pub percentage: f64,
    pub data_used_mb: f64,
    pub data_quota_mb: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionCancelled {
    pub subscription_id: Uuid,
    pub customer_id: String,
    pub phone_number: String,
    pub reason: String,
    pub immediate: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSuspended {
    pub subscription_id: Uuid,
    pub customer_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceIssued {
    pub subscription_id: Uuid,
    pub customer_id: String,
    pub order_id: String,
    pub amount: Decimal,
    pub currency_code: String,
    pub renewal_date: DateTime<Utc>,
}

fn payload<T: Serialize>(event: &T) -> Result<serde_json::Value, TelecomError> {
    serde_json::to_value(event)
        .map_err(|e| TelecomError::Gateway(anyhow::anyhow!("Failed to encode event: {}", e)))
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: &'static str, data: serde_json::Value)
        -> Result<(), TelecomError>;

    /// 50% and 80% quota alerts.
    async fn usage_threshold(&self, alert: &UsageAlert) -> Result<(), TelecomError> {
        self.publish(alert.threshold.event_name(), payload(alert)?)
            .await
    }

    async fn limit_reached(&self, alert: &UsageAlert) -> Result<(), TelecomError> {
        self.publish(UsageThreshold::Exhausted.event_name(), payload(alert)?)
            .await
    }

    async fn subscription_cancelled(
        &self,
        event: &SubscriptionCancelled,
    ) -> Result<(), TelecomError> {
        self.publish(EVENT_SUBSCRIPTION_CANCELLED, payload(event)?)
            .await
    }

    async fn subscription_suspended(
        &self,
        event: &SubscriptionSuspended,
    ) -> Result<(), TelecomError> {
        self.publish(EVENT_SUBSCRIPTION_SUSPENDED, payload(event)?)
            .await
    }

    async fn invoice_issued(&self, event: &InvoiceIssued) -> Result<(), TelecomError> {
        self.publish(EVENT_INVOICE_ISSUED, payload(event)?).await
    }
}

/// Writes every event to the structured log. Used when no webhook is set.
#[derive(Debug, Default)]
pub struct LoggingNotificationSink;

#[async_trait]
impl NotificationSink for LoggingNotificationSink {
    async fn publish(
        &self,
        event: &'static str,
        data: serde_json::Value,
    ) -> Result<(), TelecomError> {
        if event == UsageThreshold::Exhausted.event_name() {
            warn!(event = event, data = %data, "Notification");
        } else {
            info!(event = event, data = %data, "Notification");
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    event: &'a str,
    data: &'a serde_json::Value,
    emitted_at: DateTime<Utc>,
}

/// Posts events as JSON to an HTTP endpoint, retrying transient failures.
pub struct WebhookNotificationSink {
    client: Client,
    url: String,
    max_elapsed: Duration,
}

impl WebhookNotificationSink {
    pub fn new(url: impl Into<String>) -> Result<Self, TelecomError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                TelecomError::Gateway(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            url: url.into(),
            max_elapsed: Duration::from_secs(30),
        })
    }

    /// Bound the total time spent retrying one event.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    async fn post_once(&self, body: &WebhookPayload<'_>) -> Result<(), backoff::Error<anyhow::Error>> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| backoff::Error::transient(anyhow::anyhow!("Webhook unreachable: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let err = anyhow::anyhow!("Webhook returned {}", status);
        if status.is_server_error() || status.as_u16() == 429 {
            Err(backoff::Error::transient(err))
        } else {
            Err(backoff::Error::permanent(err))
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookNotificationSink {
    async fn publish(
        &self,
        event: &'static str,
        data: serde_json::Value,
    ) -> Result<(), TelecomError> {
        let body = WebhookPayload {
            event,
            data: &data,
            emitted_at: Utc::now(),
        };

        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        retry(backoff, || self.post_once(&body))
            .await
            .map_err(TelecomError::Gateway)?;

        info!(event = event, "Notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn logging_sink_accepts_every_event() {
        let sink = LoggingNotificationSink;
        let alert = UsageAlert {
            subscription_id: Uuid::new_v4(),
            customer_id: "cus_01".to_string(),
            phone_number: "+919111111111".to_string(),
            cycle: "2026-01".to_string(),
            threshold: UsageThreshold::Exhausted,
            percentage: 100.0,
            data_used_mb: 42000.0,
            data_quota_mb: 42000,
        };
        assert!(sink.limit_reached(&alert).await.is_ok());
        assert!(sink
            .subscription_suspended(&SubscriptionSuspended {
                subscription_id: alert.subscription_id,
                customer_id: alert.customer_id.clone(),
                reason: "wallet_insufficient".to_string(),
            })
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn webhook_sink_reports_unreachable_endpoint() {
        let sink = WebhookNotificationSink::new("http://127.0.0.1:9/hook")
            .unwrap()
            .with_max_elapsed(Duration::from_millis(300));

        let err = sink
            .publish(EVENT_INVOICE_ISSUED, serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "gateway");
    }
}
