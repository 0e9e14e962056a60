use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{ApiError, Payload};
use crate::auth::AuthContext;
use crate::models::{Revenue, RevenueInput};
use crate::revenue::RevenueSummary;
use crate::store::{AppointmentStore, RevenueStore};
use crate::AppState;

fn revenue_not_found(id: Uuid) -> ApiError {
    ApiError::not_found(format!("Revenue entry with id {} not found", id))
}

/// GET /api/revenue
pub async fn list_revenue(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<Vec<Revenue>>, ApiError> {
    ctx.require_staff()?;
    Ok(Json(state.store.list_revenue().await?))
}

/// GET /api/revenue/summary
pub async fn summary(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<RevenueSummary>, ApiError> {
    ctx.require_staff()?;
    let revenue = state.store.list_revenue().await?;
    let appointments = state.store.all_appointments().await?;
    Ok(Json(RevenueSummary::compute(
        &revenue,
        &appointments,
        Utc::now().date_naive(),
    )))
}

/// POST /api/revenue
pub async fn create_revenue(
    State(state): State<AppState>,
    ctx: AuthContext,
    Payload(input): Payload<RevenueInput>,
) -> Result<(StatusCode, Json<Revenue>), ApiError> {
    ctx.require_staff()?;
    input.validate().map_err(ApiError::bad_request)?;

    let revenue = state.store.create_revenue(input).await?;
    tracing::info!("✓ Revenue {} recorded ({})", revenue.id, revenue.amount);
    Ok((StatusCode::CREATED, Json(revenue)))
}

/// PUT /api/revenue/:id
pub async fn update_revenue(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Payload(input): Payload<RevenueInput>,
) -> Result<Json<Revenue>, ApiError> {
    ctx.require_staff()?;
    input.validate().map_err(ApiError::bad_request)?;

    let revenue = state
        .store
        .update_revenue(id, input)
        .await?
        .ok_or_else(|| revenue_not_found(id))?;
    tracing::info!("✓ Revenue {} updated", id);
    Ok(Json(revenue))
}

/// DELETE /api/revenue/:id
pub async fn delete_revenue(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    ctx.require_staff()?;
    if !state.store.delete_revenue(id).await? {
        return Err(revenue_not_found(id));
    }
    tracing::info!("✓ Revenue {} deleted", id);
    Ok(Json(json!({ "success": true, "message": "Revenue entry deleted" })))
}
