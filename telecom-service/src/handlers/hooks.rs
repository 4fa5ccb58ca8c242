//! Inbound event hooks from the commerce platform and the network.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Deserialize;
use validator::Validate;

use crate::engines::ProvisioningResult;
use crate::error::TelecomError;
use crate::handlers::reject;
use crate::models::{Order, UsageBatchResult, UsageReport};
use crate::startup::AppState;
use service_core::error::AppError;

/// `order.placed` event. The full order may be carried inline; otherwise it
/// must already be known to the order gateway.
#[derive(Debug, Deserialize, Validate)]
pub struct OrderPlacedEvent {
    #[validate(length(min = 1, message = "Order id is required"))]
    pub id: String,
    #[serde(default)]
    pub order: Option<Order>,
}

#[tracing::instrument(skip(state, event), fields(order_id = %event.id))]
pub async fn order_placed(
    State(state): State<AppState>,
    Json(event): Json<OrderPlacedEvent>,
) -> Result<Json<ProvisioningResult>, AppError> {
    event.validate()?;

    if let Some(order) = &event.order {
        if order.order_id != event.id {
            return Err(reject("order_placed")(TelecomError::InvalidInput(
                "order.id does not match event id".to_string(),
            )));
        }
        state
            .orders
            .upsert_order(order)
            .await
            .map_err(reject("order_placed"))?;
    }

    let result = state
        .provisioning
        .run(&event.id, Utc::now())
        .await
        .map_err(reject("order_placed"))?;

    Ok(Json(result))
}

#[tracing::instrument(skip(state, reports), fields(reports = reports.len()))]
pub async fn usage_update(
    State(state): State<AppState>,
    Json(reports): Json<Vec<UsageReport>>,
) -> Json<UsageBatchResult> {
    Json(state.meter.record_usage(&reports).await)
}
