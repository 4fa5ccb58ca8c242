//! Plan configuration model.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a plan is paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Prepaid,
    Postpaid,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Prepaid => "prepaid",
            PlanType::Postpaid => "postpaid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prepaid" => Some(PlanType::Prepaid),
            "postpaid" => Some(PlanType::Postpaid),
            _ => None,
        }
    }
}

/// Technical configuration attached to a catalog product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanConfiguration {
    pub plan_id: Uuid,
    pub product_id: String,
    pub plan_type: PlanType,
    pub data_quota_mb: i64,
    pub voice_quota_min: i64,
    pub contract_months: i32,
    pub is_5g: bool,
    pub created_utc: DateTime<Utc>,
}

impl PlanConfiguration {
    /// Length of one billing cycle in months. Zero or negative contract
    /// lengths mean a monthly plan.
    pub fn cycle_months(&self) -> u32 {
        cycle_months(self.contract_months)
    }

    /// End of the cycle starting at `start`. Day-of-month clamps to the
    /// last day of shorter months.
    pub fn period_end(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        start.checked_add_months(Months::new(self.cycle_months()))
    }
}

fn cycle_months(contract_months: i32) -> u32 {
    if contract_months > 0 {
        contract_months as u32
    } else {
        1
    }
}

/// Input for creating a plan configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlan {
    pub product_id: String,
    pub plan_type: PlanType,
    pub data_quota_mb: i64,
    pub voice_quota_min: i64,
    #[serde(default)]
    pub contract_months: i32,
    #[serde(default)]
    pub is_5g: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan(contract_months: i32) -> PlanConfiguration {
        PlanConfiguration {
            plan_id: Uuid::new_v4(),
            product_id: "prod_hero_299".to_string(),
            plan_type: PlanType::Prepaid,
            data_quota_mb: 42000,
            voice_quota_min: 1000,
            contract_months,
            is_5g: true,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn period_end_adds_contract_months() {
        let start = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        assert_eq!(
            plan(0).period_end(start),
            Some(Utc.with_ymd_and_hms(2026, 2, 15, 10, 0, 0).unwrap())
        );
        assert_eq!(
            plan(12).period_end(start),
            Some(Utc.with_ymd_and_hms(2027, 1, 15, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn period_end_clamps_to_month_end() {
        let start = Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap();
        assert_eq!(
            plan(1).period_end(start),
            Some(Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn zero_contract_is_monthly() {
        assert_eq!(cycle_months(0), 1);
        assert_eq!(cycle_months(-3), 1);
        assert_eq!(cycle_months(12), 12);
    }

    #[test]
    fn plan_type_round_trips_through_str() {
        for t in [PlanType::Prepaid, PlanType::Postpaid] {
            assert_eq!(PlanType::parse(t.as_str()), Some(t));
        }
        assert_eq!(PlanType::parse("hybrid"), None);
    }
}
