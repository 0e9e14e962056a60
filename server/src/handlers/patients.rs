use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use json_patch::Patch;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{ApiError, Payload};
use crate::auth::AuthContext;
use crate::models::{Patient, PatientInput, PatientOrder};
use crate::store::PatientStore;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct PatientQuery {
    /// Case-insensitive substring over names, email and phone
    pub search: Option<String>,
    /// `newest` (default) or `oldest`
    #[serde(default)]
    pub order: PatientOrder,
}

fn patient_not_found(id: Uuid) -> ApiError {
    ApiError::not_found(format!("Patient with id {} not found", id))
}

/// GET /api/patients
pub async fn list_patients(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<PatientQuery>,
) -> Result<Json<Vec<Patient>>, ApiError> {
    ctx.require_staff()?;
    let patients = state
        .store
        .list_patients(query.search.as_deref(), query.order)
        .await?;
    Ok(Json(patients))
}

/// GET /api/patients/:id
pub async fn get_patient(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Patient>, ApiError> {
    ctx.require_staff()?;
    let patient = state
        .store
        .get_patient(id)
        .await?
        .ok_or_else(|| patient_not_found(id))?;
    Ok(Json(patient))
}

/// POST /api/patients
pub async fn create_patient(
    State(state): State<AppState>,
    ctx: AuthContext,
    Payload(input): Payload<PatientInput>,
) -> Result<(StatusCode, Json<Patient>), ApiError> {
    ctx.require_staff()?;
    input.validate().map_err(ApiError::bad_request)?;

    let patient = state.store.create_patient(input).await?;
    tracing::info!("✓ Patient {} created", patient.id);
    Ok((StatusCode::CREATED, Json(patient)))
}

/// PUT /api/patients/:id
pub async fn update_patient(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Payload(input): Payload<PatientInput>,
) -> Result<Json<Patient>, ApiError> {
    ctx.require_staff()?;
    input.validate().map_err(ApiError::bad_request)?;

    let patient = state
        .store
        .update_patient(id, input)
        .await?
        .ok_or_else(|| patient_not_found(id))?;
    tracing::info!("✓ Patient {} updated", id);
    Ok(Json(patient))
}

/// PATCH /api/patients/:id
///
/// Applies an RFC 6902 JSON Patch to the stored patient. `id` and
/// `created_at` cannot be changed.
pub async fn patch_patient(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Payload(patch): Payload<Patch>,
) -> Result<Json<Patient>, ApiError> {
    ctx.require_staff()?;

    let existing = state
        .store
        .get_patient(id)
        .await?
        .ok_or_else(|| patient_not_found(id))?;
    let created_at = existing.created_at;

    let mut value = serde_json::to_value(&existing)
        .map_err(|e| ApiError::internal_error(format!("Failed to serialize patient: {}", e)))?;
    json_patch::patch(&mut value, &patch)
        .map_err(|e| ApiError::bad_request(format!("Failed to apply patch: {}", e)))?;

    let patched: Patient = serde_json::from_value(value)
        .map_err(|e| ApiError::bad_request(format!("Patch results in an invalid patient: {}", e)))?;
    if patched.id != id {
        return Err(ApiError::bad_request("Patient id cannot be changed"));
    }
    if patched.created_at != created_at {
        return Err(ApiError::bad_request("Patient created_at cannot be changed"));
    }

    let input = PatientInput::from(patched);
    input.validate().map_err(ApiError::bad_request)?;

    let patient = state
        .store
        .update_patient(id, input)
        .await?
        .ok_or_else(|| patient_not_found(id))?;
    tracing::info!("✓ Patient {} patched", id);
    Ok(Json(patient))
}

/// DELETE /api/patients/:id
pub async fn delete_patient(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    ctx.require_staff()?;
    if !state.store.delete_patient(id).await? {
        return Err(patient_not_found(id));
    }
    tracing::info!("✓ Patient {} deleted", id);
    Ok(Json(json!({ "success": true, "message": "Patient deleted" })))
}
