//! Services module for telecom-service.

pub mod database;
pub mod memory;
pub mod metrics;
pub mod notifications;
pub mod store;
pub mod wallet;

pub use database::Database;
pub use memory::InMemoryStore;
pub use metrics::{
    get_metrics, init_metrics, record_error, record_number_operation, record_provisioning_run,
    record_renewal, record_subscription_operation, record_usage_alert, record_usage_report,
};
pub use notifications::{
    InvoiceIssued, LoggingNotificationSink, NotificationSink, SubscriptionCancelled,
    SubscriptionSuspended, UsageAlert, WebhookNotificationSink,
};
pub use store::{OrderGateway, StoreResult, TelecomStore};
pub use wallet::{MockWallet, WalletGateway, WalletMode};
