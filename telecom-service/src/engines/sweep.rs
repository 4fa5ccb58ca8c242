//! Periodic scan for subscriptions due for renewal.

use crate::engines::RenewalEngine;
use crate::error::TelecomError;
use crate::services::{record_error, TelecomStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub subscription_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub due: usize,
    pub renewed: usize,
    pub suspended: usize,
    pub failed: Vec<SweepFailure>,
}

pub struct RenewalSweep {
    store: Arc<dyn TelecomStore>,
    engine: Arc<RenewalEngine>,
    batch_size: i64,
}

impl RenewalSweep {
    pub fn new(store: Arc<dyn TelecomStore>, engine: Arc<RenewalEngine>, batch_size: i64) -> Self {
        Self {
            store,
            engine,
            batch_size: batch_size.max(1),
        }
    }

    /// Renew every due subscription in one batch. One failure does not stop
    /// the rest.
    #[instrument(skip(self))]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, TelecomError> {
        let due = self
            .store
            .find_due_subscriptions(now, self.batch_size)
            .await?;

        let mut report = SweepReport {
            due: due.len(),
            ..Default::default()
        };

        for subscription in due {
            match self.engine.renew(subscription.subscription_id, now).await {
                Ok(outcome) if outcome.usage_counter_id.is_some() => report.renewed += 1,
                Ok(_) => report.suspended += 1,
                Err(e) => {
                    record_error(e.kind(), "renewal_sweep");
                    error!(
                        subscription_id = %subscription.subscription_id,
                        error = %e,
                        "Renewal failed"
                    );
                    report.failed.push(SweepFailure {
                        subscription_id: subscription.subscription_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        if report.due > 0 {
            info!(
                due = report.due,
                renewed = report.renewed,
                suspended = report.suspended,
                failed = report.failed.len(),
                "Renewal sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweep every `period` until the task is dropped.
    pub async fn run_every(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep(Utc::now()).await {
                record_error(e.kind(), "renewal_sweep");
                error!(error = %e, "Renewal sweep could not list due subscriptions");
            }
        }
    }
}
