use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, Payload};
use crate::auth::{login as open_session, AuthContext};
use crate::store::ProfileStore;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Payload(request): Payload<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let session = open_session(
        state.store.as_ref(),
        &request.email,
        &request.password,
        state.session_ttl,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "token": session.token,
        "user_id": session.user_id,
        "expires_at": session.expires_at,
    })))
}

/// GET /api/me
pub async fn me(State(state): State<AppState>, ctx: AuthContext) -> Result<Json<Value>, ApiError> {
    let profile = state
        .store
        .get_profile(ctx.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}
