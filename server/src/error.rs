use thiserror::Error;

use crate::store::StoreError;

/// Outcome of the single revert attempted after a failed promotion write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Nothing had been written yet, so nothing needed reverting.
    NotNeeded,
    /// The acting superadmin was restored.
    Reverted,
    /// Restoring the acting superadmin failed too; the system holds one fewer superadmin.
    RevertFailed(String),
}

#[derive(Debug, Error)]
pub enum ClinicError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("role transfer failed: {reason}")]
    TransferFailed {
        reason: String,
        compensation: Compensation,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ClinicError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ClinicError::InvalidRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ClinicError::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ClinicError::Forbidden(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ClinicError::Unauthorized(message.into())
    }
}

pub type ClinicResult<T> = Result<T, ClinicError>;
