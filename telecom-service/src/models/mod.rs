//! Domain models for telecom-service.

mod order;
mod phone_number;
mod plan;
mod subscription;
mod usage;

pub use order::{DraftOrderRequest, LineItem, Order, OrderStatus, ALLOCATED_NUMBER_KEY};
pub use phone_number::{
    ListNumbersFilter, NewPhoneNumber, NumberStatus, NumberTier, PhoneNumber, ReservationFilter,
};
pub use plan::{CreatePlan, PlanConfiguration, PlanType};
pub use subscription::{
    ListSubscriptionsFilter, NewSubscription, RenewalUpdate, Subscription, SubscriptionStatus,
};
pub use usage::{
    cycle_key, UsageBatchResult, UsageCounter, UsageError, UsageReport, UsageThreshold,
};
