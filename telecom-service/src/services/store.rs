//! Persistence seams for the orchestration core.
//!
//! The engines only talk to these traits. [`Database`](super::Database)
//! implements them on PostgreSQL and [`InMemoryStore`](super::InMemoryStore)
//! in process memory. Every compound operation here is atomic in both
//! implementations; the engines never read-modify-write a row themselves.

use crate::error::TelecomError;
use crate::models::{
    CreatePlan, DraftOrderRequest, ListNumbersFilter, ListSubscriptionsFilter, NewPhoneNumber,
    NewSubscription, NumberStatus, Order, PhoneNumber, PlanConfiguration, RenewalUpdate,
    ReservationFilter, Subscription, SubscriptionStatus, UsageCounter,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub type StoreResult<T> = Result<T, TelecomError>;

#[async_trait]
pub trait TelecomStore: Send + Sync {
    /// Cheap round trip used by health and readiness probes.
    async fn health_check(&self) -> StoreResult<()>;

    // ---------------------------------------------------------------------
    // Phone numbers
    // ---------------------------------------------------------------------

    /// Add a pool entry in `available` status.
    async fn insert_phone_number(&self, input: &NewPhoneNumber) -> StoreResult<PhoneNumber>;

    async fn get_phone_number(&self, number_id: Uuid) -> StoreResult<Option<PhoneNumber>>;

    async fn find_phone_number(&self, phone_number: &str) -> StoreResult<Option<PhoneNumber>>;

    async fn list_phone_numbers(&self, filter: &ListNumbersFilter)
        -> StoreResult<Vec<PhoneNumber>>;

    /// Atomically move the first `available` entry matching `filter`
    /// (insertion order) to `reserved` and return it.
    async fn claim_available_number(
        &self,
        filter: &ReservationFilter,
    ) -> StoreResult<Option<PhoneNumber>>;

    /// Compare-and-set a number's status. `expected` empty means any status.
    /// The back-reference is overwritten with `subscription_id`.
    ///
    /// Returns `None` when the number does not exist or its status is not in
    /// `expected`.
    async fn transition_number(
        &self,
        number_id: Uuid,
        expected: &[NumberStatus],
        status: NumberStatus,
        subscription_id: Option<Uuid>,
    ) -> StoreResult<Option<PhoneNumber>>;

    // ---------------------------------------------------------------------
    // Plan configurations
    // ---------------------------------------------------------------------

    async fn insert_plan(&self, input: &CreatePlan) -> StoreResult<PlanConfiguration>;

    async fn get_plan(&self, plan_id: Uuid) -> StoreResult<Option<PlanConfiguration>>;

    async fn find_plan_by_product(&self, product_id: &str)
        -> StoreResult<Option<PlanConfiguration>>;

    async fn list_plans(&self) -> StoreResult<Vec<PlanConfiguration>>;

    // ---------------------------------------------------------------------
    // Subscriptions
    // ---------------------------------------------------------------------

    /// Create an `active` subscription. Fails if the number already has a
    /// non-cancelled subscription.
    async fn insert_subscription(&self, input: &NewSubscription) -> StoreResult<Subscription>;

    async fn get_subscription(&self, subscription_id: Uuid) -> StoreResult<Option<Subscription>>;

    /// The non-cancelled subscription holding `number_id`, if any.
    async fn find_open_subscription_for_number(
        &self,
        number_id: Uuid,
    ) -> StoreResult<Option<Subscription>>;

    /// Page of subscriptions plus the total number matching the filter.
    async fn list_subscriptions(
        &self,
        filter: &ListSubscriptionsFilter,
    ) -> StoreResult<(Vec<Subscription>, i64)>;

    /// Compare-and-set a subscription's status. Returns `None` when the
    /// subscription does not exist or its status is not in `expected`.
    async fn transition_subscription(
        &self,
        subscription_id: Uuid,
        expected: &[SubscriptionStatus],
        status: SubscriptionStatus,
    ) -> StoreResult<Option<Subscription>>;

    /// Non-cancelled subscriptions with `renewal_date <= now`, oldest first,
    /// with suspended lines after every other due line.
    async fn find_due_subscriptions(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Subscription>>;

    /// In one transaction: move the subscription to its new period, set it
    /// `active`, and create (or reuse) the zeroed counter for the new cycle.
    async fn apply_renewal(
        &self,
        update: &RenewalUpdate,
    ) -> StoreResult<Option<(Subscription, UsageCounter)>>;

    /// In one transaction: set an open subscription `cancelled` and return
    /// its number to `available` with no back-reference. Returns `None` when
    /// the subscription is missing or already cancelled.
    async fn cancel_subscription(
        &self,
        subscription_id: Uuid,
    ) -> StoreResult<Option<(Subscription, PhoneNumber)>>;

    /// Hide a subscription from every query (compensation only).
    async fn soft_delete_subscription(&self, subscription_id: Uuid) -> StoreResult<()>;

    // ---------------------------------------------------------------------
    // Usage counters
    // ---------------------------------------------------------------------

    async fn get_usage_counter(
        &self,
        subscription_id: Uuid,
        cycle: &str,
    ) -> StoreResult<Option<UsageCounter>>;

    /// Create a zeroed counter unless one exists. The flag tells whether this
    /// call created it.
    async fn create_usage_counter_if_absent(
        &self,
        subscription_id: Uuid,
        cycle: &str,
    ) -> StoreResult<(UsageCounter, bool)>;

    /// Atomically add deltas to the counter, creating it if absent.
    async fn increment_usage(
        &self,
        subscription_id: Uuid,
        cycle: &str,
        data_mb: f64,
        voice_min: f64,
    ) -> StoreResult<UsageCounter>;

    /// Atomically OR `bits` into the counter's fired-alert set and return the
    /// set as it was before.
    async fn mark_alerts_fired(&self, counter_id: Uuid, bits: i32) -> StoreResult<i32>;
}

/// Commerce-side collaborator: orders placed by the storefront and drafts
/// created for postpaid renewals.
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn get_order(&self, order_id: &str) -> StoreResult<Option<Order>>;

    /// Insert or replace an order and its line items.
    async fn upsert_order(&self, order: &Order) -> StoreResult<()>;

    /// Create the renewal draft, or return the one already stored under
    /// [`DraftOrderRequest::order_id`].
    async fn create_draft_order(&self, request: &DraftOrderRequest) -> StoreResult<Order>;
}
