//! Usage counter model and quota thresholds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-subscription, per-cycle usage totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UsageCounter {
    pub counter_id: Uuid,
    pub subscription_id: Uuid,
    pub cycle: String,
    pub data_used_mb: f64,
    pub voice_used_min: f64,
    /// Bit set of [`UsageThreshold::bit`] values already alerted this cycle.
    pub alerts_fired: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Year-month key (`YYYY-MM`) of the cycle starting at `period_start`.
pub fn cycle_key(period_start: DateTime<Utc>) -> String {
    period_start.format("%Y-%m").to_string()
}

/// Data quota thresholds that raise alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageThreshold {
    Half,
    Critical,
    Exhausted,
}

impl UsageThreshold {
    pub fn percent(&self) -> u8 {
        match self {
            UsageThreshold::Half => 50,
            UsageThreshold::Critical => 80,
            UsageThreshold::Exhausted => 100,
        }
    }

    pub fn bit(&self) -> i32 {
        match self {
            UsageThreshold::Half => 0b001,
            UsageThreshold::Critical => 0b010,
            UsageThreshold::Exhausted => 0b100,
        }
    }

    /// Event name published on the notification bus.
    pub fn event_name(&self) -> &'static str {
        match self {
            UsageThreshold::Half => "telecom.usage.threshold_50",
            UsageThreshold::Critical => "telecom.usage.threshold_80",
            UsageThreshold::Exhausted => "telecom.usage.limit_reached",
        }
    }

    /// Band a usage percentage falls into. Lower bounds are inclusive.
    pub fn band(percentage: f64) -> Option<Self> {
        if percentage >= 100.0 {
            Some(UsageThreshold::Exhausted)
        } else if percentage >= 80.0 {
            Some(UsageThreshold::Critical)
        } else if percentage >= 50.0 {
            Some(UsageThreshold::Half)
        } else {
            None
        }
    }
}

/// One usage delta reported by the network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    #[serde(alias = "phone_number")]
    pub msisdn: String,
    #[serde(default)]
    pub data_mb: f64,
    #[serde(default)]
    pub voice_min: f64,
}

/// A report that could not be applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageError {
    pub msisdn: String,
    pub reason: String,
}

/// Outcome of a usage batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageBatchResult {
    pub updated: usize,
    pub errors: Vec<UsageError>,
}
