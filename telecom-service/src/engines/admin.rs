//! Subscription administration.

use crate::error::TelecomError;
use crate::models::{
    cycle_key, ListSubscriptionsFilter, PhoneNumber, Subscription, SubscriptionStatus,
    UsageCounter,
};
use crate::services::{
    record_number_operation, record_subscription_operation, NotificationSink,
    SubscriptionCancelled, TelecomStore,
};
use futures::future::try_join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const DEFAULT_CANCEL_REASON: &str = "Customer request";
pub const DEFAULT_PAGE_LIMIT: i64 = 20;
pub const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Clone, Default)]
pub struct SubscriptionQuery {
    pub status: Option<SubscriptionStatus>,
    pub customer_id: Option<String>,
    pub msisdn: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NumberRef {
    pub number_id: Uuid,
    pub phone_number: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSummary {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub msisdn: Option<NumberRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionPage {
    pub subscriptions: Vec<SubscriptionSummary>,
    pub count: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionDetails {
    pub subscription: Subscription,
    pub msisdn: Option<PhoneNumber>,
    pub current_usage: Option<UsageCounter>,
}

pub struct SubscriptionAdmin {
    store: Arc<dyn TelecomStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl SubscriptionAdmin {
    pub fn new(store: Arc<dyn TelecomStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, query: &SubscriptionQuery) -> Result<SubscriptionPage, TelecomError> {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        let offset = query.offset.unwrap_or(0);
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(TelecomError::InvalidInput(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }
        if offset < 0 {
            return Err(TelecomError::InvalidInput("offset must not be negative".to_string()));
        }

        let empty = SubscriptionPage {
            subscriptions: Vec::new(),
            count: 0,
            limit,
            offset,
        };

        let number_id = match &query.msisdn {
            Some(msisdn) => match self.store.find_phone_number(msisdn).await? {
                Some(number) => Some(number.number_id),
                None => return Ok(empty),
            },
            None => None,
        };

        let (subscriptions, count) = self
            .store
            .list_subscriptions(&ListSubscriptionsFilter {
                status: query.status,
                customer_id: query.customer_id.clone(),
                number_id,
                include_deleted: false,
                limit,
                offset,
            })
            .await?;

        let summaries = try_join_all(subscriptions.into_iter().map(|subscription| async move {
            let msisdn = self
                .store
                .get_phone_number(subscription.number_id)
                .await?
                .map(|n| NumberRef {
                    number_id: n.number_id,
                    phone_number: n.phone_number,
                });
            Ok::<_, TelecomError>(SubscriptionSummary {
                subscription,
                msisdn,
            })
        }))
        .await?;

        Ok(SubscriptionPage {
            subscriptions: summaries,
            count,
            ..empty
        })
    }

    #[instrument(skip(self))]
    pub async fn get(&self, subscription_id: Uuid) -> Result<SubscriptionDetails, TelecomError> {
        let subscription = self.load(subscription_id).await?;
        let msisdn = self.store.get_phone_number(subscription.number_id).await?;
        let current_usage = self
            .store
            .get_usage_counter(
                subscription_id,
                &cycle_key(subscription.current_period_start),
            )
            .await?;

        Ok(SubscriptionDetails {
            subscription,
            msisdn,
            current_usage,
        })
    }

    /// Cancel a line and return its number to the pool. Both writes land
    /// together or not at all, so a failed cancel can be retried.
    #[instrument(skip(self, reason))]
    pub async fn cancel(
        &self,
        subscription_id: Uuid,
        reason: Option<String>,
        immediate: bool,
    ) -> Result<Subscription, TelecomError> {
        let subscription = self.load(subscription_id).await?;
        if subscription.status == SubscriptionStatus::Cancelled {
            return Err(TelecomError::AlreadyCancelled);
        }

        let (cancelled, number) = self
            .store
            .cancel_subscription(subscription_id)
            .await?
            .ok_or(TelecomError::AlreadyCancelled)?;
        record_number_operation("release", "ok");

        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());
        record_subscription_operation("cancel");
        info!(reason = %reason, immediate = immediate, "Subscription cancelled");

        let notified = self
            .notifier
            .subscription_cancelled(&SubscriptionCancelled {
                subscription_id,
                customer_id: cancelled.customer_id.clone(),
                phone_number: number.phone_number,
                reason,
                immediate,
            })
            .await;
        if let Err(e) = notified {
            warn!(error = %e, "Failed to deliver cancellation notification");
        }

        Ok(cancelled)
    }

    #[instrument(skip(self))]
    pub async fn suspend(&self, subscription_id: Uuid) -> Result<Subscription, TelecomError> {
        let subscription = self
            .transition(
                subscription_id,
                &[SubscriptionStatus::Active, SubscriptionStatus::Barred],
                SubscriptionStatus::Suspended,
            )
            .await?;
        record_subscription_operation("suspend");
        Ok(subscription)
    }

    #[instrument(skip(self))]
    pub async fn reactivate(&self, subscription_id: Uuid) -> Result<Subscription, TelecomError> {
        let subscription = self
            .transition(
                subscription_id,
                &[SubscriptionStatus::Suspended, SubscriptionStatus::Barred],
                SubscriptionStatus::Active,
            )
            .await?;
        record_subscription_operation("reactivate");
        Ok(subscription)
    }

    async fn load(&self, subscription_id: Uuid) -> Result<Subscription, TelecomError> {
        self.store
            .get_subscription(subscription_id)
            .await?
            .ok_or(TelecomError::SubscriptionNotFound(subscription_id))
    }

    async fn transition(
        &self,
        subscription_id: Uuid,
        expected: &[SubscriptionStatus],
        to: SubscriptionStatus,
    ) -> Result<Subscription, TelecomError> {
        if let Some(updated) = self
            .store
            .transition_subscription(subscription_id, expected, to)
            .await?
        {
            info!(status = to.as_str(), "Subscription status changed");
            return Ok(updated);
        }

        let current = self.load(subscription_id).await?;
        Err(match current.status {
            SubscriptionStatus::Cancelled => TelecomError::AlreadyCancelled,
            from => TelecomError::InvalidStateTransition {
                entity: "subscription",
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            },
        })
    }
}
