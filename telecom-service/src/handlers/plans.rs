use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::handlers::reject;
use crate::models::{CreatePlan, PlanConfiguration, PlanType};
use crate::startup::AppState;
use service_core::error::AppError;

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePlanRequest {
    #[validate(length(min = 1, max = 255, message = "Product id is required"))]
    pub product_id: String,
    pub plan_type: PlanType,
    #[validate(range(min = 0))]
    pub data_quota_mb: i64,
    #[validate(range(min = 0))]
    pub voice_quota_min: i64,
    #[serde(default)]
    #[validate(range(min = 0, max = 60))]
    pub contract_months: i32,
    #[serde(default)]
    pub is_5g: bool,
}

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub plans: Vec<PlanConfiguration>,
}

#[tracing::instrument(skip(state, request), fields(product_id = %request.product_id))]
pub async fn create_plan(
    State(state): State<AppState>,
    Json(request): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<PlanConfiguration>), AppError> {
    request.validate()?;

    let plan = state
        .store
        .insert_plan(&CreatePlan {
            product_id: request.product_id,
            plan_type: request.plan_type,
            data_quota_mb: request.data_quota_mb,
            voice_quota_min: request.voice_quota_min,
            contract_months: request.contract_months,
            is_5g: request.is_5g,
        })
        .await
        .map_err(reject("create_plan"))?;

    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn list_plans(State(state): State<AppState>) -> Result<Json<PlansResponse>, AppError> {
    let plans = state.store.list_plans().await.map_err(reject("list_plans"))?;
    Ok(Json(PlansResponse { plans }))
}
