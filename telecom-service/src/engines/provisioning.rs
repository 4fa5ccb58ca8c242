//! Turns a placed order into active subscriptions.
//!
//! The run is split into stages (enrich, validate, create subscriptions,
//! activate inventory, initialize usage). Every stage is idempotent, so a
//! redelivered order finds the work already done and creates nothing new.
//! When a stage fails, the work of the current run is rolled back before the
//! error is returned.

use crate::engines::InventoryAllocator;
use crate::error::TelecomError;
use crate::models::{
    cycle_key, LineItem, NewSubscription, NumberStatus, PhoneNumber, PlanConfiguration,
    Subscription,
};
use crate::services::{record_provisioning_run, OrderGateway, TelecomStore};
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub const SKIP_PLAN_NOT_FOUND: &str = "plan configuration not found";
pub const SKIP_RESERVATION_NOT_FOUND: &str = "reservation not found";
pub const SKIP_RESERVATION_STATE: &str = "number is not reserved for this order";

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedLine {
    pub subscription_id: Uuid,
    pub line_item_id: String,
    pub number_id: Uuid,
    pub phone_number: String,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedItem {
    pub line_item_id: String,
    pub phone_number: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProvisioningResult {
    pub order_id: String,
    pub subscriptions: Vec<ProvisionedLine>,
    pub activated_count: usize,
    pub initialized_count: usize,
    pub skipped: Vec<SkippedItem>,
}

/// A plan item that passed validation.
struct Candidate<'a> {
    item: &'a LineItem,
    plan: PlanConfiguration,
    number: PhoneNumber,
    existing: Option<Subscription>,
}

/// Work done by the current run, undone if a later stage fails.
#[derive(Default)]
struct Journal {
    created_subscriptions: Vec<Uuid>,
    activated_numbers: Vec<Uuid>,
}

pub struct ProvisioningPipeline {
    store: Arc<dyn TelecomStore>,
    orders: Arc<dyn OrderGateway>,
    inventory: InventoryAllocator,
}

impl ProvisioningPipeline {
    pub fn new(
        store: Arc<dyn TelecomStore>,
        orders: Arc<dyn OrderGateway>,
        inventory: InventoryAllocator,
    ) -> Self {
        Self {
            store,
            orders,
            inventory,
        }
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn run(
        &self,
        order_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProvisioningResult, TelecomError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| TelecomError::OrderNotFound(order_id.to_string()))?;

        let mut result = ProvisioningResult {
            order_id: order.order_id.clone(),
            ..Default::default()
        };

        let candidates = self
            .validate(&order.order_id, &order.items, &mut result)
            .await?;

        if candidates.is_empty() {
            info!(skipped = result.skipped.len(), "No plan items to provision");
            record_provisioning_run("noop");
            return Ok(result);
        }

        let mut journal = Journal::default();
        match self
            .provision(&order.customer_id, &order.order_id, candidates, now, &mut journal, &mut result)
            .await
        {
            Ok(()) => {
                record_provisioning_run("ok");
                info!(
                    subscriptions = result.subscriptions.len(),
                    activated = result.activated_count,
                    initialized = result.initialized_count,
                    skipped = result.skipped.len(),
                    "Order provisioned"
                );
                Ok(result)
            }
            Err(err) => {
                record_provisioning_run("failed");
                error!(error = %err, "Provisioning failed, compensating");
                self.compensate(journal).await;
                Err(err)
            }
        }
    }

    /// Enrich and validate plan items. Items that cannot be provisioned are
    /// recorded as skipped.
    async fn validate<'a>(
        &self,
        order_id: &str,
        items: &'a [LineItem],
        result: &mut ProvisioningResult,
    ) -> Result<Vec<Candidate<'a>>, TelecomError> {
        let mut candidates = Vec::new();

        for item in items {
            let Some(phone_number) = item.allocated_number() else {
                continue;
            };
            let skip = |reason: &str| SkippedItem {
                line_item_id: item.line_item_id.clone(),
                phone_number: Some(phone_number.to_string()),
                reason: reason.to_string(),
            };

            let Some(plan) = self.store.find_plan_by_product(&item.product_id).await? else {
                warn!(product_id = %item.product_id, "No plan configuration for product");
                result.skipped.push(skip(SKIP_PLAN_NOT_FOUND));
                continue;
            };

            let Some(number) = self.store.find_phone_number(phone_number).await? else {
                warn!(phone_number = %phone_number, "Allocated number not in pool");
                result.skipped.push(skip(SKIP_RESERVATION_NOT_FOUND));
                continue;
            };

            let existing = self
                .store
                .find_open_subscription_for_number(number.number_id)
                .await?;

            let provisioned_here = existing
                .as_ref()
                .is_some_and(|s| s.order_id == order_id && s.line_item_id == item.line_item_id);

            let accepted = match number.status {
                NumberStatus::Reserved => existing.is_none() || provisioned_here,
                NumberStatus::Active => provisioned_here,
                NumberStatus::Available | NumberStatus::CoolingDown => false,
            };

            if !accepted {
                warn!(
                    phone_number = %phone_number,
                    status = number.status.as_str(),
                    "Allocated number is not reserved for this line"
                );
                result.skipped.push(skip(SKIP_RESERVATION_STATE));
                continue;
            }

            candidates.push(Candidate {
                item,
                plan,
                number,
                existing,
            });
        }

        Ok(candidates)
    }

    async fn provision(
        &self,
        customer_id: &str,
        order_id: &str,
        candidates: Vec<Candidate<'_>>,
        now: DateTime<Utc>,
        journal: &mut Journal,
        result: &mut ProvisioningResult,
    ) -> Result<(), TelecomError> {
        // Create subscriptions
        let mut lines: Vec<(Subscription, PhoneNumber)> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let (subscription, created) = match candidate.existing {
                Some(existing) => (existing, false),
                None => {
                    let renewal_date = candidate.plan.period_end(now).ok_or_else(|| {
                        TelecomError::InvalidInput("renewal date out of range".to_string())
                    })?;
                    let subscription = self
                        .store
                        .insert_subscription(&NewSubscription {
                            customer_id: customer_id.to_string(),
                            number_id: candidate.number.number_id,
                            plan_id: candidate.plan.plan_id,
                            order_id: order_id.to_string(),
                            line_item_id: candidate.item.line_item_id.clone(),
                            current_period_start: now,
                            renewal_date,
                            billing_day: now.day() as i32,
                        })
                        .await?;
                    journal.created_subscriptions.push(subscription.subscription_id);
                    (subscription, true)
                }
            };

            result.subscriptions.push(ProvisionedLine {
                subscription_id: subscription.subscription_id,
                line_item_id: candidate.item.line_item_id.clone(),
                number_id: candidate.number.number_id,
                phone_number: candidate.number.phone_number.clone(),
                created,
            });
            lines.push((subscription, candidate.number));
        }

        // Activate inventory
        for (subscription, number) in &lines {
            if number.status != NumberStatus::Reserved {
                continue;
            }
            self.inventory
                .activate_number(number.number_id, subscription.subscription_id)
                .await?;
            journal.activated_numbers.push(number.number_id);
            result.activated_count += 1;
        }

        // Initialize usage
        for (subscription, _) in &lines {
            let cycle = cycle_key(subscription.current_period_start);
            let (_, created) = self
                .store
                .create_usage_counter_if_absent(subscription.subscription_id, &cycle)
                .await?;
            if created {
                result.initialized_count += 1;
            }
        }

        Ok(())
    }

    /// Best effort: failures are logged, the original error is what the
    /// caller sees.
    async fn compensate(&self, journal: Journal) {
        for number_id in journal.activated_numbers {
            let reverted = self
                .store
                .transition_number(
                    number_id,
                    &[NumberStatus::Active],
                    NumberStatus::Reserved,
                    None,
                )
                .await;
            if let Err(e) = reverted {
                error!(number_id = %number_id, error = %e, "Failed to revert number activation");
            }
        }

        for subscription_id in journal.created_subscriptions {
            if let Err(e) = self.store.soft_delete_subscription(subscription_id).await {
                error!(
                    subscription_id = %subscription_id,
                    error = %e,
                    "Failed to remove subscription"
                );
            }
        }
    }
}
