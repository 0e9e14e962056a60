use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::{ClinicError, Compensation};
use crate::store::StoreError;

/// Error response rendered as `{"success": false, "message": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub reverted: Option<bool>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            reverted: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<ClinicError> for ApiError {
    fn from(err: ClinicError) -> Self {
        match err {
            ClinicError::InvalidRequest(message) => Self::bad_request(message),
            ClinicError::NotFound(message) => Self::not_found(message),
            ClinicError::Unauthorized(message) => Self::new(StatusCode::UNAUTHORIZED, message),
            ClinicError::Forbidden(message) => Self::new(StatusCode::FORBIDDEN, message),
            ClinicError::TransferFailed {
                reason,
                compensation,
            } => {
                let (suffix, reverted) = match &compensation {
                    Compensation::NotNeeded => (String::new(), None),
                    Compensation::Reverted => (
                        "; your superadmin role was restored".to_string(),
                        Some(true),
                    ),
                    Compensation::RevertFailed(e) => (
                        format!("; restoring your superadmin role also failed: {}", e),
                        Some(false),
                    ),
                };
                Self {
                    status: StatusCode::CONFLICT,
                    message: format!("Role transfer failed: {}{}", reason, suffix),
                    reverted,
                }
            }
            ClinicError::Store(e) => e.into(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!("Store failure: {}", err);
        Self::internal_error(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "success": false,
            "message": self.message,
        });
        if let Some(reverted) = self.reverted {
            body["reverted"] = json!(reverted);
        }
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ClinicError::invalid("x"), StatusCode::BAD_REQUEST),
            (ClinicError::not_found("x"), StatusCode::NOT_FOUND),
            (ClinicError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (ClinicError::forbidden("x"), StatusCode::FORBIDDEN),
            (
                ClinicError::Store(StoreError::Backend("down".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn test_transfer_failure_reports_revert() {
        let err = ApiError::from(ClinicError::TransferFailed {
            reason: "promote failed".to_string(),
            compensation: Compensation::Reverted,
        });
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.reverted, Some(true));
        assert!(err.message.contains("restored"));

        let err = ApiError::from(ClinicError::TransferFailed {
            reason: "promote failed".to_string(),
            compensation: Compensation::RevertFailed("db down".to_string()),
        });
        assert_eq!(err.reverted, Some(false));
        assert!(err.message.contains("db down"));
    }
}
