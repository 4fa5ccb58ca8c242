use axum::{extract::State, Json};
use chrono::Utc;

use crate::engines::SweepReport;
use crate::handlers::reject;
use crate::startup::AppState;
use service_core::error::AppError;

/// Run one renewal sweep now.
#[tracing::instrument(skip(state))]
pub async fn run_sweep(State(state): State<AppState>) -> Result<Json<SweepReport>, AppError> {
    let report = state
        .sweep
        .sweep(Utc::now())
        .await
        .map_err(reject("renewal_sweep"))?;

    Ok(Json(report))
}
