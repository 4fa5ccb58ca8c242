//! Subscription model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Suspended,
    Barred,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Barred => "barred",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "suspended" => Some(SubscriptionStatus::Suspended),
            "barred" => Some(SubscriptionStatus::Barred),
            "cancelled" => Some(SubscriptionStatus::Cancelled),
            _ => None,
        }
    }

    /// Statuses that still hold a phone number.
    pub const OPEN: [SubscriptionStatus; 3] = [
        SubscriptionStatus::Active,
        SubscriptionStatus::Suspended,
        SubscriptionStatus::Barred,
    ];

    pub fn is_open(&self) -> bool {
        SubscriptionStatus::OPEN.contains(self)
    }
}

/// A provisioned telecom line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub customer_id: String,
    pub status: SubscriptionStatus,
    pub number_id: Uuid,
    pub plan_id: Uuid,
    pub order_id: String,
    pub line_item_id: String,
    pub current_period_start: DateTime<Utc>,
    pub renewal_date: DateTime<Utc>,
    pub billing_day: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a subscription.
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub customer_id: String,
    pub number_id: Uuid,
    pub plan_id: Uuid,
    pub order_id: String,
    pub line_item_id: String,
    pub current_period_start: DateTime<Utc>,
    pub renewal_date: DateTime<Utc>,
    pub billing_day: i32,
}

/// Filter parameters for listing subscriptions.
#[derive(Debug, Clone, Default)]
pub struct ListSubscriptionsFilter {
    pub status: Option<SubscriptionStatus>,
    pub customer_id: Option<String>,
    pub number_id: Option<Uuid>,
    pub include_deleted: bool,
    pub limit: i64,
    pub offset: i64,
}

/// New billing period written by a successful renewal.
#[derive(Debug, Clone)]
pub struct RenewalUpdate {
    pub subscription_id: Uuid,
    pub current_period_start: DateTime<Utc>,
    pub renewal_date: DateTime<Utc>,
    pub cycle: String,
}
