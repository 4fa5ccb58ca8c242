//! Subscription lifecycle engines.

pub mod admin;
pub mod inventory;
pub mod metering;
pub mod provisioning;
pub mod renewal;
pub mod sweep;

pub use admin::{
    SubscriptionAdmin, SubscriptionDetails, SubscriptionPage, SubscriptionQuery,
    SubscriptionSummary,
};
pub use inventory::InventoryAllocator;
pub use metering::UsageMeter;
pub use provisioning::{ProvisioningPipeline, ProvisioningResult};
pub use renewal::{RenewalEngine, RenewalOutcome, RenewalPricing};
pub use sweep::{RenewalSweep, SweepReport};
