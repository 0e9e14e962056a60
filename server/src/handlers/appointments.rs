use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::{ApiError, Payload};
use crate::auth::AuthContext;
use crate::models::{AppointmentInput, AppointmentOccurrence, StoredAppointment};
use crate::recurrence::{calendar_window, expand, on_day};
use crate::store::{AppointmentStore, PatientStore, RevenueStore};
use crate::AppState;

fn appointment_not_found(id: Uuid) -> ApiError {
    ApiError::not_found(format!("Appointment with id {} not found", id))
}

#[derive(Debug, Default, Deserialize)]
pub struct CalendarQuery {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    /// Restrict the response to occurrences on this date.
    pub day: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct CalendarResponse {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub occurrences: Vec<AppointmentOccurrence>,
}

/// GET /api/appointments
pub async fn list_appointments(
    State(state): State<AppState>,
    ctx: AuthContext,
) -> Result<Json<Vec<StoredAppointment>>, ApiError> {
    ctx.require_staff()?;
    Ok(Json(state.store.all_appointments().await?))
}

/// GET /api/appointments/calendar
pub async fn calendar(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<CalendarResponse>, ApiError> {
    ctx.require_staff()?;

    let (default_start, default_end) = calendar_window(Utc::now().date_naive());
    let start = query.start.unwrap_or(default_start);
    let end = query.end.unwrap_or(default_end);
    if start > end {
        return Err(ApiError::bad_request("start must not be after end"));
    }

    let stored = state.store.list_appointments(start, end).await?;
    let mut occurrences = expand(&stored, start, end);
    occurrences.sort_by_key(|o| o.start_at);
    if let Some(day) = query.day {
        occurrences = on_day(&occurrences, day);
    }

    tracing::debug!(
        "Calendar {}..{}: {} stored, {} occurrences",
        start,
        end,
        stored.len(),
        occurrences.len()
    );
    Ok(Json(CalendarResponse {
        start,
        end,
        occurrences,
    }))
}

/// GET /api/appointments/:id
pub async fn get_appointment(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<StoredAppointment>, ApiError> {
    ctx.require_staff()?;
    let appointment = state
        .store
        .get_appointment(id)
        .await?
        .ok_or_else(|| appointment_not_found(id))?;
    Ok(Json(appointment))
}

async fn check_patient(state: &AppState, input: &AppointmentInput) -> Result<(), ApiError> {
    input.validate().map_err(ApiError::bad_request)?;
    if state.store.get_patient(input.patient_id).await?.is_none() {
        return Err(ApiError::bad_request(format!(
            "Patient with id {} does not exist",
            input.patient_id
        )));
    }
    Ok(())
}

/// POST /api/appointments
pub async fn create_appointment(
    State(state): State<AppState>,
    ctx: AuthContext,
    Payload(input): Payload<AppointmentInput>,
) -> Result<(StatusCode, Json<StoredAppointment>), ApiError> {
    ctx.require_staff()?;
    check_patient(&state, &input).await?;

    let appointment = state.store.create_appointment(input).await?;
    tracing::info!("✓ Appointment {} created", appointment.id);
    Ok((StatusCode::CREATED, Json(appointment)))
}

/// PUT /api/appointments/:id
pub async fn update_appointment(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
    Payload(input): Payload<AppointmentInput>,
) -> Result<Json<StoredAppointment>, ApiError> {
    ctx.require_staff()?;
    check_patient(&state, &input).await?;

    let appointment = state
        .store
        .update_appointment(id, input)
        .await?
        .ok_or_else(|| appointment_not_found(id))?;
    tracing::info!("✓ Appointment {} updated", id);
    Ok(Json(appointment))
}

/// DELETE /api/appointments/:id
///
/// Revenue rows pointing at the appointment are detached first.
pub async fn delete_appointment(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    ctx.require_staff()?;

    match state.store.detach_appointment(id).await {
        Ok(0) => {}
        Ok(n) => tracing::info!("Detached {} revenue rows from appointment {}", n, id),
        Err(e) => tracing::warn!("Could not detach revenue from appointment {}: {}", id, e),
    }

    if !state.store.delete_appointment(id).await? {
        return Err(appointment_not_found(id));
    }
    tracing::info!("✓ Appointment {} deleted", id);
    Ok(Json(json!({ "success": true, "message": "Appointment deleted" })))
}
