//! Domain errors for telecom-service.

use chrono::{DateTime, Utc};
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TelecomError {
    #[error("Order {0} not found")]
    OrderNotFound(String),

    #[error("Subscription not found")]
    SubscriptionNotFound(Uuid),

    #[error("Phone number not found")]
    NumberNotFound(Uuid),

    #[error("Plan configuration not found for {0}")]
    PlanNotFound(String),

    #[error("No available number matches the requested filters")]
    NoAvailableNumber,

    #[error("Number {0} is not available")]
    NumberUnavailable(String),

    #[error("Number {0} already exists in the pool")]
    DuplicateNumber(String),

    #[error("A plan configuration already exists for product {0}")]
    DuplicatePlan(String),

    #[error("Invalid state transition for {entity}: {from} -> {to}")]
    InvalidStateTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Subscription is already cancelled")]
    AlreadyCancelled,

    #[error("Subscription is not due for renewal until {0}")]
    RenewalNotDue(DateTime<Utc>),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Persistence failure: {0}")]
    Persistence(anyhow::Error),

    #[error("Gateway failure: {0}")]
    Gateway(anyhow::Error),
}

impl TelecomError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            TelecomError::OrderNotFound(_)
                | TelecomError::SubscriptionNotFound(_)
                | TelecomError::NumberNotFound(_)
                | TelecomError::PlanNotFound(_)
        )
    }

    /// Short label used for the error metric.
    pub fn kind(&self) -> &'static str {
        match self {
            TelecomError::OrderNotFound(_)
            | TelecomError::SubscriptionNotFound(_)
            | TelecomError::NumberNotFound(_)
            | TelecomError::PlanNotFound(_) => "not_found",
            TelecomError::NoAvailableNumber
            | TelecomError::NumberUnavailable(_)
            | TelecomError::DuplicateNumber(_)
            | TelecomError::DuplicatePlan(_) => "reservation",
            TelecomError::InvalidStateTransition { .. }
            | TelecomError::AlreadyCancelled
            | TelecomError::RenewalNotDue(_) => "state_conflict",
            TelecomError::InvalidInput(_) => "invalid_input",
            TelecomError::Persistence(_) => "persistence",
            TelecomError::Gateway(_) => "gateway",
        }
    }

    pub(crate) fn persistence(context: &str, err: impl std::fmt::Display) -> Self {
        TelecomError::Persistence(anyhow::anyhow!("{}: {}", context, err))
    }
}

impl From<TelecomError> for AppError {
    fn from(err: TelecomError) -> Self {
        let message = err.to_string();
        match err {
            TelecomError::OrderNotFound(_)
            | TelecomError::SubscriptionNotFound(_)
            | TelecomError::NumberNotFound(_)
            | TelecomError::PlanNotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            TelecomError::InvalidStateTransition { .. }
            | TelecomError::AlreadyCancelled
            | TelecomError::RenewalNotDue(_)
            | TelecomError::InvalidInput(_) => AppError::BadRequest(anyhow::anyhow!(message)),
            TelecomError::NoAvailableNumber
            | TelecomError::NumberUnavailable(_)
            | TelecomError::DuplicateNumber(_)
            | TelecomError::DuplicatePlan(_) => AppError::Conflict(anyhow::anyhow!(message)),
            TelecomError::Persistence(inner) => AppError::ServiceUnavailable(inner),
            TelecomError::Gateway(inner) => AppError::BadGateway(inner.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn status_of(err: TelecomError) -> StatusCode {
        AppError::from(err).status_and_body().0
    }

    #[test]
    fn maps_taxonomy_to_status_codes() {
        assert_eq!(
            status_of(TelecomError::SubscriptionNotFound(Uuid::nil())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(TelecomError::AlreadyCancelled), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(TelecomError::RenewalNotDue(chrono::Utc::now())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(TelecomError::NoAvailableNumber), StatusCode::CONFLICT);
        assert_eq!(
            status_of(TelecomError::Persistence(anyhow::anyhow!("down"))),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(TelecomError::Gateway(anyhow::anyhow!("timeout"))),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn already_cancelled_message_is_user_facing() {
        let (_, body) = AppError::from(TelecomError::AlreadyCancelled).status_and_body();
        assert_eq!(body.error, "Subscription is already cancelled");
    }
}
