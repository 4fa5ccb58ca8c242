//! Usage accumulation and quota enforcement.

use crate::error::TelecomError;
use crate::models::{
    cycle_key, SubscriptionStatus, UsageBatchResult, UsageError, UsageReport, UsageThreshold,
};
use crate::services::{
    record_usage_alert, record_usage_report, NotificationSink, TelecomStore, UsageAlert,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Why a single report was not applied. The message is returned to the
/// caller verbatim.
#[derive(Debug, Error)]
enum Rejection {
    #[error("invalid usage delta")]
    InvalidDelta,
    #[error("phone number not found")]
    UnknownNumber,
    #[error("no active subscription")]
    NoSubscription,
    #[error("plan configuration not found")]
    NoPlan,
    #[error(transparent)]
    Store(#[from] TelecomError),
}

fn valid_delta(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

pub struct UsageMeter {
    store: Arc<dyn TelecomStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl UsageMeter {
    pub fn new(store: Arc<dyn TelecomStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    /// Apply every report independently. The batch always completes; reports
    /// that fail are listed in `errors`.
    #[instrument(skip(self, reports), fields(reports = reports.len()))]
    pub async fn record_usage(&self, reports: &[UsageReport]) -> UsageBatchResult {
        let mut result = UsageBatchResult::default();

        for report in reports {
            match self.apply(report).await {
                Ok(()) => {
                    record_usage_report("applied");
                    result.updated += 1;
                }
                Err(rejection) => {
                    record_usage_report("rejected");
                    warn!(msisdn = %report.msisdn, reason = %rejection, "Usage report rejected");
                    result.errors.push(UsageError {
                        msisdn: report.msisdn.clone(),
                        reason: rejection.to_string(),
                    });
                }
            }
        }

        result
    }

    async fn apply(&self, report: &UsageReport) -> Result<(), Rejection> {
        if !valid_delta(report.data_mb) || !valid_delta(report.voice_min) {
            return Err(Rejection::InvalidDelta);
        }

        let number = self
            .store
            .find_phone_number(&report.msisdn)
            .await?
            .ok_or(Rejection::UnknownNumber)?;
        let subscription = self
            .store
            .find_open_subscription_for_number(number.number_id)
            .await?
            .ok_or(Rejection::NoSubscription)?;
        let plan = self
            .store
            .get_plan(subscription.plan_id)
            .await?
            .ok_or(Rejection::NoPlan)?;

        let cycle = cycle_key(subscription.current_period_start);
        let counter = self
            .store
            .increment_usage(
                subscription.subscription_id,
                &cycle,
                report.data_mb,
                report.voice_min,
            )
            .await?;

        if plan.data_quota_mb <= 0 {
            return Ok(());
        }

        let percentage = counter.data_used_mb / plan.data_quota_mb as f64 * 100.0;
        let Some(threshold) = UsageThreshold::band(percentage) else {
            return Ok(());
        };
        if counter.alerts_fired & threshold.bit() != 0 {
            return Ok(());
        }

        // Bar before claiming the alert so a failure here leaves the alert
        // claimable by the next report.
        if threshold == UsageThreshold::Exhausted {
            let barred = self
                .store
                .transition_subscription(
                    subscription.subscription_id,
                    &[SubscriptionStatus::Active],
                    SubscriptionStatus::Barred,
                )
                .await?;
            if barred.is_some() {
                warn!(
                    subscription_id = %subscription.subscription_id,
                    data_used_mb = counter.data_used_mb,
                    "Subscription barred, data quota exhausted"
                );
            }
        }

        let previous = self
            .store
            .mark_alerts_fired(counter.counter_id, threshold.bit())
            .await?;
        if previous & threshold.bit() != 0 {
            return Ok(());
        }

        let alert = UsageAlert {
            subscription_id: subscription.subscription_id,
            customer_id: subscription.customer_id.clone(),
            phone_number: number.phone_number.clone(),
            cycle,
            threshold,
            percentage,
            data_used_mb: counter.data_used_mb,
            data_quota_mb: plan.data_quota_mb,
        };

        record_usage_alert(threshold.event_name());
        info!(
            subscription_id = %alert.subscription_id,
            threshold = threshold.percent(),
            percentage = alert.percentage,
            "Usage threshold crossed"
        );

        let delivered = match threshold {
            UsageThreshold::Exhausted => self.notifier.limit_reached(&alert).await,
            UsageThreshold::Half | UsageThreshold::Critical => {
                self.notifier.usage_threshold(&alert).await
            }
        };
        if let Err(e) = delivered {
            warn!(
                subscription_id = %alert.subscription_id,
                error = %e,
                "Failed to deliver usage notification"
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_and_non_finite_deltas() {
        assert!(valid_delta(0.0));
        assert!(valid_delta(12.5));
        assert!(!valid_delta(-1.0));
        assert!(!valid_delta(f64::NAN));
        assert!(!valid_delta(f64::INFINITY));
    }

    #[test]
    fn rejection_messages_are_stable() {
        assert_eq!(Rejection::UnknownNumber.to_string(), "phone number not found");
        assert_eq!(Rejection::NoSubscription.to_string(), "no active subscription");
    }
}
