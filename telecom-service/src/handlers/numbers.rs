use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::handlers::reject;
use crate::models::{
    ListNumbersFilter, NewPhoneNumber, NumberStatus, NumberTier, PhoneNumber, ReservationFilter,
};
use crate::startup::AppState;
use service_core::error::AppError;

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct NumberInput {
    #[validate(length(min = 3, max = 32, message = "Phone number must be 3-32 characters"))]
    pub phone_number: String,
    #[serde(default)]
    pub tier: NumberTier,
    #[validate(length(min = 1, max = 16, message = "Region code is required"))]
    pub region_code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddNumbersRequest {
    #[validate(length(min = 1, max = 1000, message = "Provide 1-1000 numbers"), nested)]
    pub numbers: Vec<NumberInput>,
}

#[derive(Debug, Serialize)]
pub struct NumbersResponse {
    pub numbers: Vec<PhoneNumber>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ListNumbersQuery {
    pub status: Option<NumberStatus>,
    pub region_code: Option<String>,
    pub tier: Option<NumberTier>,
    #[validate(range(min = 1, max = 500))]
    pub limit: Option<i64>,
    #[validate(range(min = 0))]
    pub offset: Option<i64>,
}

#[tracing::instrument(skip(state, request), fields(count = request.numbers.len()))]
pub async fn add_numbers(
    State(state): State<AppState>,
    Json(request): Json<AddNumbersRequest>,
) -> Result<(StatusCode, Json<NumbersResponse>), AppError> {
    request.validate()?;

    let entries: Vec<NewPhoneNumber> = request
        .numbers
        .into_iter()
        .map(|n| NewPhoneNumber {
            phone_number: n.phone_number,
            tier: n.tier,
            region_code: n.region_code,
        })
        .collect();

    let numbers = state
        .inventory
        .add_numbers(&entries)
        .await
        .map_err(reject("add_numbers"))?;

    Ok((StatusCode::CREATED, Json(NumbersResponse { numbers })))
}

pub async fn list_numbers(
    State(state): State<AppState>,
    Query(query): Query<ListNumbersQuery>,
) -> Result<Json<NumbersResponse>, AppError> {
    query.validate()?;

    let numbers = state
        .inventory
        .list_numbers(&ListNumbersFilter {
            status: query.status,
            region_code: query.region_code,
            tier: query.tier,
            limit: query.limit.unwrap_or(50),
            offset: query.offset.unwrap_or(0),
        })
        .await
        .map_err(reject("list_numbers"))?;

    Ok(Json(NumbersResponse { numbers }))
}

#[tracing::instrument(skip(state))]
pub async fn reserve_number(
    State(state): State<AppState>,
    Json(filter): Json<ReservationFilter>,
) -> Result<Json<PhoneNumber>, AppError> {
    let number = state
        .inventory
        .reserve_number(&filter)
        .await
        .map_err(reject("reserve_number"))?;

    Ok(Json(number))
}

#[tracing::instrument(skip(state))]
pub async fn release_number(
    State(state): State<AppState>,
    Path(number_id): Path<Uuid>,
) -> Result<Json<PhoneNumber>, AppError> {
    let number = state
        .inventory
        .release_number(number_id)
        .await
        .map_err(reject("release_number"))?;

    Ok(Json(number))
}
