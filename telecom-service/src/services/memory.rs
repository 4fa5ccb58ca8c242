//! In-process store for development (`STORAGE_BACKEND=memory`) and tests.
//!
//! A single `RwLock` guards all tables, so each trait call is atomic with
//! respect to every other call, matching the row-level guarantees of the
//! PostgreSQL store.

use crate::error::TelecomError;
use crate::models::{
    CreatePlan, DraftOrderRequest, ListNumbersFilter, ListSubscriptionsFilter, NewPhoneNumber,
    NewSubscription, NumberStatus, Order, PhoneNumber,
    PlanConfiguration, RenewalUpdate, ReservationFilter, Subscription, SubscriptionStatus,
    UsageCounter,
};
use crate::services::store::{OrderGateway, StoreResult, TelecomStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    numbers: Vec<PhoneNumber>,
    plans: Vec<PlanConfiguration>,
    subscriptions: Vec<SubscriptionRow>,
    counters: Vec<UsageCounter>,
    orders: HashMap<String, Order>,
    failures: HashSet<&'static str>,
}

struct SubscriptionRow {
    subscription: Subscription,
    deleted: bool,
}

impl Tables {
    /// Consume an injected failure for `operation`, if one is armed.
    fn check_failure(&mut self, operation: &'static str) -> StoreResult<()> {
        if self.failures.remove(operation) {
            return Err(TelecomError::persistence(operation, "injected failure"));
        }
        Ok(())
    }

    fn live_subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.subscriptions
            .iter()
            .filter(|row| !row.deleted)
            .map(|row| &row.subscription)
    }

    fn live_subscription_mut(&mut self, subscription_id: Uuid) -> Option<&mut Subscription> {
        self.subscriptions
            .iter_mut()
            .find(|row| !row.deleted && row.subscription.subscription_id == subscription_id)
            .map(|row| &mut row.subscription)
    }

    fn counter_for_cycle(&mut self, subscription_id: Uuid, cycle: &str) -> (usize, bool) {
        if let Some(idx) = self
            .counters
            .iter()
            .position(|c| c.subscription_id == subscription_id && c.cycle == cycle)
        {
            return (idx, false);
        }

        let now = Utc::now();
        self.counters.push(UsageCounter {
            counter_id: Uuid::new_v4(),
            subscription_id,
            cycle: cycle.to_string(),
            data_used_mb: 0.0,
            voice_used_min: 0.0,
            alerts_fired: 0,
            created_utc: now,
            updated_utc: now,
        });
        (self.counters.len() - 1, true)
    }
}

/// Store backed by process memory.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `operation` (a trait method name) fail with a
    /// persistence error. Used to exercise compensation paths.
    pub async fn fail_next(&self, operation: &'static str) {
        self.tables.write().await.failures.insert(operation);
    }

    /// Every counter ever created for a subscription, oldest first.
    pub async fn usage_history(&self, subscription_id: Uuid) -> Vec<UsageCounter> {
        self.tables
            .read()
            .await
            .counters
            .iter()
            .filter(|c| c.subscription_id == subscription_id)
            .cloned()
            .collect()
    }

    /// Subscriptions including soft-deleted ones.
    pub async fn subscription_count_including_deleted(&self) -> usize {
        self.tables.read().await.subscriptions.len()
    }
}

fn page<T: Clone>(items: Vec<&T>, offset: i64, limit: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl TelecomStore for InMemoryStore {
    async fn health_check(&self) -> StoreResult<()> {
        self.tables.write().await.check_failure("health_check")
    }

    async fn insert_phone_number(&self, input: &NewPhoneNumber) -> StoreResult<PhoneNumber> {
        let mut tables = self.tables.write().await;
        tables.check_failure("insert_phone_number")?;

        if tables
            .numbers
            .iter()
            .any(|n| n.phone_number == input.phone_number)
        {
            return Err(TelecomError::DuplicateNumber(input.phone_number.clone()));
        }

        let now = Utc::now();
        let number = PhoneNumber {
            number_id: Uuid::new_v4(),
            phone_number: input.phone_number.clone(),
            status: NumberStatus::Available,
            tier: input.tier,
            region_code: input.region_code.clone(),
            subscription_id: None,
            created_utc: now,
            updated_utc: now,
        };
        tables.numbers.push(number.clone());
        Ok(number)
    }

    async fn get_phone_number(&self, number_id: Uuid) -> StoreResult<Option<PhoneNumber>> {
        let mut tables = self.tables.write().await;
        tables.check_failure("get_phone_number")?;
        Ok(tables
            .numbers
            .iter()
            .find(|n| n.number_id == number_id)
            .cloned())
    }

    async fn find_phone_number(&self, phone_number: &str) -> StoreResult<Option<PhoneNumber>> {
        let mut tables = self.tables.write().await;
        tables.check_failure("find_phone_number")?;
        Ok(tables
            .numbers
            .iter()
            .find(|n| n.phone_number == phone_number)
            .cloned())
    }

    async fn list_phone_numbers(
        &self,
        filter: &ListNumbersFilter,
    ) -> StoreResult<Vec<PhoneNumber>> {
        let tables = self.tables.read().await;
        let matching = tables
            .numbers
            .iter()
            .filter(|n| filter.status.map_or(true, |s| n.status == s))
            .filter(|n| {
                filter
                    .region_code
                    .as_deref()
                    .map_or(true, |r| n.region_code == r)
            })
            .filter(|n| filter.tier.map_or(true, |t| n.tier == t))
            .collect();
        Ok(page(matching, filter.offset, filter.limit))
    }

    async fn claim_available_number(
        &self,
        filter: &ReservationFilter,
    ) -> StoreResult<Option<PhoneNumber>> {
        let mut tables = self.tables.write().await;
        tables.check_failure("claim_available_number")?;

        let Some(number) = tables.numbers.iter_mut().find(|n| filter.matches(n)) else {
            return Ok(None);
        };
        number.status = NumberStatus::Reserved;
        number.updated_utc = Utc::now();
        Ok(Some(number.clone()))
    }

    async fn transition_number(
        &self,
        number_id: Uuid,
        expected: &[NumberStatus],
        status: NumberStatus,
        subscription_id: Option<Uuid>,
    ) -> StoreResult<Option<PhoneNumber>> {
        let mut tables = self.tables.write().await;
        tables.check_failure("transition_number")?;

        let Some(number) = tables.numbers.iter_mut().find(|n| n.number_id == number_id) else {
            return Ok(None);
        };
        if !expected.is_empty() && !expected.contains(&number.status) {
            return Ok(None);
        }
        number.status = status;
        number.subscription_id = subscription_id;
        number.updated_utc = Utc::now();
        Ok(Some(number.clone()))
    }

    async fn insert_plan(&self, input: &CreatePlan) -> StoreResult<PlanConfiguration> {
        let mut tables = self.tables.write().await;
        tables.check_failure("insert_plan")?;

        if tables.plans.iter().any(|p| p.product_id == input.product_id) {
            return Err(TelecomError::DuplicatePlan(input.product_id.clone()));
        }

        let plan = PlanConfiguration {
            plan_id: Uuid::new_v4(),
            product_id: input.product_id.clone(),
            plan_type: input.plan_type,
            data_quota_mb: input.data_quota_mb,
            voice_quota_min: input.voice_quota_min,
            contract_months: input.contract_months,
            is_5g: input.is_5g,
            created_utc: Utc::now(),
        };
        tables.plans.push(plan.clone());
        Ok(plan)
    }

    async fn get_plan(&self, plan_id: Uuid) -> StoreResult<Option<PlanConfiguration>> {
        let mut tables = self.tables.write().await;
        tables.check_failure("get_plan")?;
        Ok(tables.plans.iter().find(|p| p.plan_id == plan_id).cloned())
    }

    async fn find_plan_by_product(
        &self,
        product_id: &str,
    ) -> StoreResult<Option<PlanConfiguration>> {
        let mut tables = self.tables.write().await;
        tables.check_failure("find_plan_by_product")?;
        Ok(tables
            .plans
            .iter()
            .find(|p| p.product_id == product_id)
            .cloned())
    }

    async fn list_plans(&self) -> StoreResult<Vec<PlanConfiguration>> {
        Ok(self.tables.read().await.plans.clone())
    }

    async fn insert_subscription(&self, input: &NewSubscription) -> StoreResult<Subscription> {
        let mut tables = self.tables.write().await;
        tables.check_failure("insert_subscription")?;

        if tables
            .live_subscriptions()
            .any(|s| s.number_id == input.number_id && s.status.is_open())
        {
            return Err(TelecomError::InvalidStateTransition {
                entity: "phone number",
                from: "assigned".to_string(),
                to: "assigned".to_string(),
            });
        }

        let now = Utc::now();
        let subscription = Subscription {
            subscription_id: Uuid::new_v4(),
            customer_id: input.customer_id.clone(),
            status: SubscriptionStatus::Active,
            number_id: input.number_id,
            plan_id: input.plan_id,
            order_id: input.order_id.clone(),
            line_item_id: input.line_item_id.clone(),
            current_period_start: input.current_period_start,
            renewal_date: input.renewal_date,
            billing_day: input.billing_day,
            created_utc: now,
            updated_utc: now,
        };
        tables.subscriptions.push(SubscriptionRow {
            subscription: subscription.clone(),
            deleted: false,
        });
        Ok(subscription)
    }

    async fn get_subscription(&self, subscription_id: Uuid) -> StoreResult<Option<Subscription>> {
        let mut tables = self.tables.write().await;
        tables.check_failure("get_subscription")?;
        let subscription = tables
            .live_subscriptions()
            .find(|s| s.subscription_id == subscription_id)
            .cloned();
        Ok(subscription)
    }

    async fn find_open_subscription_for_number(
        &self,
        number_id: Uuid,
    ) -> StoreResult<Option<Subscription>> {
        let mut tables = self.tables.write().await;
        tables.check_failure("find_open_subscription_for_number")?;
        let subscription = tables
            .live_subscriptions()
            .find(|s| s.number_id == number_id && s.status.is_open())
            .cloned();
        Ok(subscription)
    }

    async fn list_subscriptions(
        &self,
        filter: &ListSubscriptionsFilter,
    ) -> StoreResult<(Vec<Subscription>, i64)> {
        let tables = self.tables.read().await;
        let matching: Vec<&Subscription> = tables
            .subscriptions
            .iter()
            .filter(|row| filter.include_deleted || !row.deleted)
            .map(|row| &row.subscription)
            .filter(|s| filter.status.map_or(true, |st| s.status == st))
            .filter(|s| {
                filter
                    .customer_id
                    .as_deref()
                    .map_or(true, |c| s.customer_id == c)
            })
            .filter(|s| filter.number_id.map_or(true, |n| s.number_id == n))
            .collect();
        let total = matching.len() as i64;
        Ok((page(matching, filter.offset, filter.limit), total))
    }

    async fn transition_subscription(
        &self,
        subscription_id: Uuid,
        expected: &[SubscriptionStatus],
        status: SubscriptionStatus,
    ) -> StoreResult<Option<Subscription>> {
        let mut tables = self.tables.write().await;
        tables.check_failure("transition_subscription")?;

        let Some(subscription) = tables.live_subscription_mut(subscription_id) else {
            return Ok(None);
        };
        if !expected.is_empty() && !expected.contains(&subscription.status) {
            return Ok(None);
        }
        subscription.status = status;
        subscription.updated_utc = Utc::now();
        Ok(Some(subscription.clone()))
    }

    async fn find_due_subscriptions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Subscription>> {
        let mut tables = self.tables.write().await;
        tables.check_failure("find_due_subscriptions")?;

        // Lines suspended for non-payment go last so they cannot hold the
        // head of the queue.
        let mut due: Vec<&Subscription> = tables
            .live_subscriptions()
            .filter(|s| s.status.is_open() && s.renewal_date <= now)
            .collect();
        due.sort_by_key(|s| (s.status == SubscriptionStatus::Suspended, s.renewal_date));
        let batch = page(due, 0, limit);
        Ok(batch)
    }

    async fn apply_renewal(
        &self,
        update: &RenewalUpdate,
    ) -> StoreResult<Option<(Subscription, UsageCounter)>> {
        let mut tables = self.tables.write().await;
        tables.check_failure("apply_renewal")?;

        let now = Utc::now();
        let subscription = match tables.live_subscription_mut(update.subscription_id) {
            Some(s) if s.status.is_open() => {
                s.current_period_start = update.current_period_start;
                s.renewal_date = update.renewal_date;
                s.status = SubscriptionStatus::Active;
                s.updated_utc = now;
                s.clone()
            }
            _ => return Ok(None),
        };

        let (idx, _) = tables.counter_for_cycle(update.subscription_id, &update.cycle);
        Ok(Some((subscription, tables.counters[idx].clone())))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: Uuid,
    ) -> StoreResult<Option<(Subscription, PhoneNumber)>> {
        let mut tables = self.tables.write().await;
        tables.check_failure("cancel_subscription")?;

        let number_id = match tables.live_subscription_mut(subscription_id) {
            Some(s) if s.status.is_open() => s.number_id,
            _ => return Ok(None),
        };
        let idx = tables
            .numbers
            .iter()
            .position(|n| n.number_id == number_id)
            .ok_or(TelecomError::NumberNotFound(number_id))?;

        let now = Utc::now();
        let number = &mut tables.numbers[idx];
        number.status = NumberStatus::Available;
        number.subscription_id = None;
        number.updated_utc = now;
        let number = number.clone();

        let subscription = match tables.live_subscription_mut(subscription_id) {
            Some(s) => {
                s.status = SubscriptionStatus::Cancelled;
                s.updated_utc = now;
                s.clone()
            }
            None => return Ok(None),
        };

        Ok(Some((subscription, number)))
    }

    async fn soft_delete_subscription(&self, subscription_id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.check_failure("soft_delete_subscription")?;
        if let Some(row) = tables
            .subscriptions
            .iter_mut()
            .find(|row| row.subscription.subscription_id == subscription_id)
        {
            row.deleted = true;
        }
        Ok(())
    }

    async fn get_usage_counter(
        &self,
        subscription_id: Uuid,
        cycle: &str,
    ) -> StoreResult<Option<UsageCounter>> {
        let mut tables = self.tables.write().await;
        tables.check_failure("get_usage_counter")?;
        Ok(tables
            .counters
            .iter()
            .find(|c| c.subscription_id == subscription_id && c.cycle == cycle)
            .cloned())
    }

    async fn create_usage_counter_if_absent(
        &self,
        subscription_id: Uuid,
        cycle: &str,
    ) -> StoreResult<(UsageCounter, bool)> {
        let mut tables = self.tables.write().await;
        tables.check_failure("create_usage_counter_if_absent")?;
        let (idx, created) = tables.counter_for_cycle(subscription_id, cycle);
        Ok((tables.counters[idx].clone(), created))
    }

    async fn increment_usage(
        &self,
        subscription_id: Uuid,
        cycle: &str,
        data_mb: f64,
        voice_min: f64,
    ) -> StoreResult<UsageCounter> {
        let mut tables = self.tables.write().await;
        tables.check_failure("increment_usage")?;
        let (idx, _) = tables.counter_for_cycle(subscription_id, cycle);
        let counter = &mut tables.counters[idx];
        counter.data_used_mb += data_mb;
        counter.voice_used_min += voice_min;
        counter.updated_utc = Utc::now();
        Ok(counter.clone())
    }

    async fn mark_alerts_fired(&self, counter_id: Uuid, bits: i32) -> StoreResult<i32> {
        let mut tables = self.tables.write().await;
        tables.check_failure("mark_alerts_fired")?;
        let counter = tables
            .counters
            .iter_mut()
            .find(|c| c.counter_id == counter_id)
            .ok_or_else(|| TelecomError::persistence("mark_alerts_fired", "counter missing"))?;
        let previous = counter.alerts_fired;
        counter.alerts_fired |= bits;
        Ok(previous)
    }
}

#[async_trait]
impl OrderGateway for InMemoryStore {
    async fn get_order(&self, order_id: &str) -> StoreResult<Option<Order>> {
        let mut tables = self.tables.write().await;
        tables.check_failure("get_order")?;
        Ok(tables.orders.get(order_id).cloned())
    }

    async fn upsert_order(&self, order: &Order) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.check_failure("upsert_order")?;
        tables.orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    async fn create_draft_order(&self, request: &DraftOrderRequest) -> StoreResult<Order> {
        let mut tables = self.tables.write().await;
        tables.check_failure("create_draft_order")?;

        let order = tables
            .orders
            .entry(request.order_id())
            .or_insert_with(|| request.to_order())
            .clone();
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NumberTier;

    fn new_number(phone: &str, region: &str, tier: NumberTier) -> NewPhoneNumber {
        NewPhoneNumber {
            phone_number: phone.to_string(),
            tier,
            region_code: region.to_string(),
        }
    }

    #[tokio::test]
    async fn claim_follows_insertion_order() {
        let store = InMemoryStore::new();
        for phone in ["+919000000003", "+919000000001", "+919000000002"] {
            store
                .insert_phone_number(&new_number(phone, "IN-MH", NumberTier::Standard))
                .await
                .unwrap();
        }

        let first = store
            .claim_available_number(&ReservationFilter::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.phone_number, "+919000000003");
        assert_eq!(first.status, NumberStatus::Reserved);

        let second = store
            .claim_available_number(&ReservationFilter::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.phone_number, "+919000000001");
    }

    #[tokio::test]
    async fn transition_respects_expected_status() {
        let store = InMemoryStore::new();
        let number = store
            .insert_phone_number(&new_number("+919000000010", "IN-KA", NumberTier::Gold))
            .await
            .unwrap();

        let none = store
            .transition_number(
                number.number_id,
                &[NumberStatus::Reserved],
                NumberStatus::Active,
                None,
            )
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn injected_failure_fires_once() {
        let store = InMemoryStore::new();
        store.fail_next("health_check").await;
        assert!(store.health_check().await.is_err());
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn alerts_fired_is_fetch_or() {
        let store = InMemoryStore::new();
        let (counter, created) = store
            .create_usage_counter_if_absent(Uuid::new_v4(), "2026-01")
            .await
            .unwrap();
        assert!(created);

        assert_eq!(store.mark_alerts_fired(counter.counter_id, 0b001).await.unwrap(), 0);
        assert_eq!(
            store.mark_alerts_fired(counter.counter_id, 0b010).await.unwrap(),
            0b001
        );
        assert_eq!(
            store.mark_alerts_fired(counter.counter_id, 0b001).await.unwrap(),
            0b011
        );
    }
}
