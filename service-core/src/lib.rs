//! service-core: configuration, error mapping, tracing and HTTP middleware
//! shared by the telecom services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;

pub use axum;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
pub use validator;
