//! HTTP handlers for telecom-service.

pub mod health;
pub mod hooks;
pub mod numbers;
pub mod plans;
pub mod renewals;
pub mod subscriptions;

use crate::error::TelecomError;
use crate::services::record_error;
use service_core::error::AppError;

/// Count the failure under `operation` and convert it for the response.
pub(crate) fn reject(operation: &'static str) -> impl Fn(TelecomError) -> AppError {
    move |err| {
        record_error(err.kind(), operation);
        AppError::from(err)
    }
}
