//! Billing-cycle renewal.
//!
//! Postpaid lines are invoiced through a draft order and always extended.
//! Prepaid lines are extended only when the wallet covers the next period,
//! otherwise they are suspended with the renewal date left in place so the
//! next sweep retries.

use crate::error::TelecomError;
use crate::models::{
    cycle_key, DraftOrderRequest, PlanType, RenewalUpdate, Subscription, SubscriptionStatus,
};
use crate::services::{
    record_renewal, InvoiceIssued, NotificationSink, OrderGateway, SubscriptionSuspended,
    TelecomStore, WalletGateway,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const SUSPEND_REASON_WALLET: &str = "insufficient wallet balance";

/// Price of one renewal period.
#[derive(Debug, Clone)]
pub struct RenewalPricing {
    pub amount: Decimal,
    pub currency_code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostpaidRenewal {
    pub draft_order_id: String,
    pub amount: Decimal,
    pub currency_code: String,
    pub invoice_sent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrepaidRenewal {
    pub wallet_check_passed: bool,
    pub should_suspend: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenewalOutcome {
    pub subscription_id: Uuid,
    pub plan_type: PlanType,
    pub postpaid: Option<PostpaidRenewal>,
    pub prepaid: Option<PrepaidRenewal>,
    pub status: SubscriptionStatus,
    pub renewal_date: DateTime<Utc>,
    pub usage_counter_id: Option<Uuid>,
}

pub struct RenewalEngine {
    store: Arc<dyn TelecomStore>,
    orders: Arc<dyn OrderGateway>,
    wallet: Arc<dyn WalletGateway>,
    notifier: Arc<dyn NotificationSink>,
    pricing: RenewalPricing,
}

impl RenewalEngine {
    pub fn new(
        store: Arc<dyn TelecomStore>,
        orders: Arc<dyn OrderGateway>,
        wallet: Arc<dyn WalletGateway>,
        notifier: Arc<dyn NotificationSink>,
        pricing: RenewalPricing,
    ) -> Self {
        Self {
            store,
            orders,
            wallet,
            notifier,
            pricing,
        }
    }

    #[instrument(skip(self, now))]
    pub async fn renew(
        &self,
        subscription_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RenewalOutcome, TelecomError> {
        let subscription = self
            .store
            .get_subscription(subscription_id)
            .await?
            .ok_or(TelecomError::SubscriptionNotFound(subscription_id))?;
        if subscription.status == SubscriptionStatus::Cancelled {
            return Err(TelecomError::AlreadyCancelled);
        }
        if subscription.renewal_date > now {
            return Err(TelecomError::RenewalNotDue(subscription.renewal_date));
        }

        let number = self
            .store
            .get_phone_number(subscription.number_id)
            .await?
            .ok_or(TelecomError::NumberNotFound(subscription.number_id))?;
        let plan = self
            .store
            .get_plan(subscription.plan_id)
            .await?
            .ok_or_else(|| TelecomError::PlanNotFound(subscription.plan_id.to_string()))?;

        info!(
            plan_type = plan.plan_type.as_str(),
            renewal_date = %subscription.renewal_date,
            "Renewing subscription"
        );

        let mut outcome = RenewalOutcome {
            subscription_id,
            plan_type: plan.plan_type,
            postpaid: None,
            prepaid: None,
            status: subscription.status,
            renewal_date: subscription.renewal_date,
            usage_counter_id: None,
        };

        let should_suspend = match plan.plan_type {
            PlanType::Postpaid => {
                outcome.postpaid = Some(
                    self.invoice(&subscription, &number.phone_number)
                        .await?,
                );
                false
            }
            PlanType::Prepaid => {
                let passed = self
                    .wallet
                    .check_balance(
                        &subscription.customer_id,
                        subscription_id,
                        self.pricing.amount,
                    )
                    .await?;
                outcome.prepaid = Some(PrepaidRenewal {
                    wallet_check_passed: passed,
                    should_suspend: !passed,
                });
                !passed
            }
        };

        if should_suspend {
            outcome.status = self.suspend(&subscription).await?;
            record_renewal(plan.plan_type.as_str(), "suspended");
            return Ok(outcome);
        }

        let period_start = subscription.renewal_date;
        let renewal_date = plan.period_end(period_start).ok_or_else(|| {
            TelecomError::InvalidInput("renewal date out of range".to_string())
        })?;

        let (renewed, counter) = self
            .store
            .apply_renewal(&RenewalUpdate {
                subscription_id,
                current_period_start: period_start,
                renewal_date,
                cycle: cycle_key(period_start),
            })
            .await?
            .ok_or(TelecomError::AlreadyCancelled)?;

        record_renewal(plan.plan_type.as_str(), "renewed");
        info!(
            renewal_date = %renewed.renewal_date,
            cycle = %counter.cycle,
            "Subscription renewed"
        );

        outcome.status = renewed.status;
        outcome.renewal_date = renewed.renewal_date;
        outcome.usage_counter_id = Some(counter.counter_id);
        Ok(outcome)
    }

    async fn invoice(
        &self,
        subscription: &Subscription,
        phone_number: &str,
    ) -> Result<PostpaidRenewal, TelecomError> {
        let draft = self
            .orders
            .create_draft_order(&DraftOrderRequest {
                customer_id: subscription.customer_id.clone(),
                subscription_id: subscription.subscription_id,
                phone_number: phone_number.to_string(),
                amount: self.pricing.amount,
                currency_code: self.pricing.currency_code.clone(),
                renewal_date: subscription.renewal_date,
            })
            .await?;

        let sent = self
            .notifier
            .invoice_issued(&InvoiceIssued {
                subscription_id: subscription.subscription_id,
                customer_id: subscription.customer_id.clone(),
                order_id: draft.order_id.clone(),
                amount: self.pricing.amount,
                currency_code: self.pricing.currency_code.clone(),
                renewal_date: subscription.renewal_date,
            })
            .await;
        if let Err(e) = &sent {
            warn!(order_id = %draft.order_id, error = %e, "Failed to deliver invoice notification");
        }

        Ok(PostpaidRenewal {
            draft_order_id: draft.order_id,
            amount: self.pricing.amount,
            currency_code: self.pricing.currency_code.clone(),
            invoice_sent: sent.is_ok(),
        })
    }

    /// Suspend for non-payment. An already suspended line stays as is and
    /// is not notified again.
    async fn suspend(
        &self,
        subscription: &Subscription,
    ) -> Result<SubscriptionStatus, TelecomError> {
        if subscription.status == SubscriptionStatus::Suspended {
            return Ok(SubscriptionStatus::Suspended);
        }

        let suspended = self
            .store
            .transition_subscription(
                subscription.subscription_id,
                &[SubscriptionStatus::Active, SubscriptionStatus::Barred],
                SubscriptionStatus::Suspended,
            )
            .await?;

        let Some(suspended) = suspended else {
            // Lost a race with cancellation or another suspension.
            let current = self
                .store
                .get_subscription(subscription.subscription_id)
                .await?
                .ok_or(TelecomError::SubscriptionNotFound(subscription.subscription_id))?;
            return match current.status {
                SubscriptionStatus::Cancelled => Err(TelecomError::AlreadyCancelled),
                status => Ok(status),
            };
        };

        warn!(
            subscription_id = %subscription.subscription_id,
            "Subscription suspended, wallet check failed"
        );

        let notified = self
            .notifier
            .subscription_suspended(&SubscriptionSuspended {
                subscription_id: subscription.subscription_id,
                customer_id: subscription.customer_id.clone(),
                reason: SUSPEND_REASON_WALLET.to_string(),
            })
            .await;
        if let Err(e) = notified {
            warn!(error = %e, "Failed to deliver suspension notification");
        }

        Ok(suspended.status)
    }
}
