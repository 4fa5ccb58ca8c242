//! Subscription administration endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::engines::{
    RenewalOutcome, SubscriptionDetails, SubscriptionPage, SubscriptionQuery,
};
use crate::handlers::reject;
use crate::models::{Subscription, SubscriptionStatus};
use crate::startup::AppState;
use service_core::error::AppError;

#[derive(Debug, Deserialize, Validate)]
pub struct ListSubscriptionsQuery {
    pub status: Option<SubscriptionStatus>,
    pub customer_id: Option<String>,
    pub msisdn: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
    #[validate(range(min = 0))]
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
    #[serde(default)]
    pub immediate: bool,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub subscription: Subscription,
    pub message: String,
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Query(query): Query<ListSubscriptionsQuery>,
) -> Result<Json<SubscriptionPage>, AppError> {
    query.validate()?;

    let page = state
        .admin
        .list(&SubscriptionQuery {
            status: query.status,
            customer_id: query.customer_id,
            msisdn: query.msisdn,
            limit: query.limit,
            offset: query.offset,
        })
        .await
        .map_err(reject("list_subscriptions"))?;

    Ok(Json(page))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<SubscriptionDetails>, AppError> {
    let details = state
        .admin
        .get(subscription_id)
        .await
        .map_err(reject("get_subscription"))?;

    Ok(Json(details))
}

#[tracing::instrument(skip(state, request))]
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
    request: Option<Json<CancelRequest>>,
) -> Result<Json<CancelResponse>, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let subscription = state
        .admin
        .cancel(subscription_id, request.reason, request.immediate)
        .await
        .map_err(reject("cancel_subscription"))?;

    Ok(Json(CancelResponse {
        success: true,
        subscription,
        message: "Subscription cancelled successfully".to_string(),
    }))
}

#[tracing::instrument(skip(state))]
pub async fn suspend_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<Subscription>, AppError> {
    let subscription = state
        .admin
        .suspend(subscription_id)
        .await
        .map_err(reject("suspend_subscription"))?;

    Ok(Json(subscription))
}

#[tracing::instrument(skip(state))]
pub async fn reactivate_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<Subscription>, AppError> {
    let subscription = state
        .admin
        .reactivate(subscription_id)
        .await
        .map_err(reject("reactivate_subscription"))?;

    Ok(Json(subscription))
}

#[tracing::instrument(skip(state))]
pub async fn renew_subscription(
    State(state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<RenewalOutcome>, AppError> {
    let outcome = state
        .renewals
        .renew(subscription_id, Utc::now())
        .await
        .map_err(reject("renew_subscription"))?;

    Ok(Json(outcome))
}
