//! MSISDN inventory model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inventory status of a phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberStatus {
    Available,
    Reserved,
    Active,
    CoolingDown,
}

impl NumberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumberStatus::Available => "available",
            NumberStatus::Reserved => "reserved",
            NumberStatus::Active => "active",
            NumberStatus::CoolingDown => "cooling_down",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "available" => Some(NumberStatus::Available),
            "reserved" => Some(NumberStatus::Reserved),
            "active" => Some(NumberStatus::Active),
            "cooling_down" => Some(NumberStatus::CoolingDown),
            _ => None,
        }
    }
}

/// Commercial tier of a phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NumberTier {
    #[default]
    Standard,
    Gold,
    Platinum,
}

impl NumberTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumberTier::Standard => "standard",
            NumberTier::Gold => "gold",
            NumberTier::Platinum => "platinum",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(NumberTier::Standard),
            "gold" => Some(NumberTier::Gold),
            "platinum" => Some(NumberTier::Platinum),
            _ => None,
        }
    }
}

/// A phone number in the pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneNumber {
    pub number_id: Uuid,
    pub phone_number: String,
    pub status: NumberStatus,
    pub tier: NumberTier,
    pub region_code: String,
    pub subscription_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for seeding a pool entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPhoneNumber {
    pub phone_number: String,
    #[serde(default)]
    pub tier: NumberTier,
    pub region_code: String,
}

/// Criteria for reserving a number.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservationFilter {
    pub region_code: Option<String>,
    pub tier: Option<NumberTier>,
    pub specific_number: Option<String>,
}

impl ReservationFilter {
    /// Whether `number` is an available entry satisfying every set criterion.
    pub fn matches(&self, number: &PhoneNumber) -> bool {
        number.status == NumberStatus::Available
            && self
                .region_code
                .as_deref()
                .map_or(true, |r| number.region_code == r)
            && self.tier.map_or(true, |t| number.tier == t)
            && self
                .specific_number
                .as_deref()
                .map_or(true, |n| number.phone_number == n)
    }
}

/// Filter parameters for listing pool entries.
#[derive(Debug, Clone, Default)]
pub struct ListNumbersFilter {
    pub status: Option<NumberStatus>,
    pub region_code: Option<String>,
    pub tier: Option<NumberTier>,
    pub limit: i64,
    pub offset: i64,
}
