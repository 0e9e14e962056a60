use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{ApiError, Payload};
use crate::auth::AuthContext;
use crate::models::{AuditLogEntry, Profile, Role};
use crate::users::AuditRequest;
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    pub target_user_id: Option<Uuid>,
    #[serde(default)]
    pub new_role: String,
}

/// PUT /api/update-role
pub async fn update_role(
    State(state): State<AppState>,
    ctx: AuthContext,
    Payload(request): Payload<UpdateRoleRequest>,
) -> Result<Json<Value>, ApiError> {
    ctx.require_superadmin("update user roles")?;

    let result = state
        .roles
        .promote(ctx.user_id, request.target_user_id, &request.new_role)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": result.message(),
        "result": result,
    })))
}

/// DELETE /api/delete-user/:user_id
pub async fn delete_user(
    State(state): State<AppState>,
    ctx: AuthContext,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    ctx.require_superadmin("delete users")?;
    let target = Uuid::parse_str(user_id.trim())
        .map_err(|_| ApiError::bad_request("Invalid user ID format"))?;

    let deleted = state.users.delete(ctx.user_id, target).await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("User {} deleted successfully", deleted.email),
    })))
}

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    #[serde(default)]
    pub email: String,
}

/// POST /api/invite-user
pub async fn invite_user(
    State(state): State<AppState>,
    ctx: AuthContext,
    Payload(request): Payload<InviteRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    ctx.require_superadmin("invite users")?;

    let invitation = state.users.invite(ctx.user_id, &request.email).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": format!("Invitation created for {}", invitation.email),
            "invitation": invitation,
        })),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub role: Option<Role>,
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<Profile>>, ApiError> {
    ctx.require_superadmin("list users")?;
    Ok(Json(state.users.list(query.role).await?))
}

/// POST /api/log-audit
pub async fn log_audit(
    State(state): State<AppState>,
    ctx: AuthContext,
    Payload(request): Payload<AuditRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    ctx.require_staff()?;

    let entry = state.users.log_audit(ctx.user_id, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "entry": entry })),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<i64>,
}

/// GET /api/audit-log
pub async fn audit_log(
    State(state): State<AppState>,
    ctx: AuthContext,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, ApiError> {
    ctx.require_staff()?;
    Ok(Json(state.users.audit_log(query.limit.unwrap_or(100)).await?))
}
