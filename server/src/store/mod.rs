//! Storage ports used by the request handlers and the role coordinator.
//!
//! `Database` implements every port over Postgres; `MemoryStore` implements
//! them in process and is what the test suite runs against.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Account, AuditLogEntry, NewAuditEntry, Patient, PatientInput, PatientOrder, Profile, Revenue,
    RevenueInput, Role, StoredAppointment, AppointmentInput,
};

pub mod memory;

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Backend(String),

    #[error("invalid stored row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn list_patients(&self, search: Option<&str>, order: PatientOrder) -> StoreResult<Vec<Patient>>;
    async fn get_patient(&self, id: Uuid) -> StoreResult<Option<Patient>>;
    async fn create_patient(&self, input: PatientInput) -> StoreResult<Patient>;
    async fn update_patient(&self, id: Uuid, input: PatientInput) -> StoreResult<Option<Patient>>;
    async fn delete_patient(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Appointments whose own start lies within `[start, end]`, ordered by start.
    async fn list_appointments(&self, start: NaiveDateTime, end: NaiveDateTime) -> StoreResult<Vec<StoredAppointment>>;
    async fn all_appointments(&self) -> StoreResult<Vec<StoredAppointment>>;
    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<StoredAppointment>>;
    async fn create_appointment(&self, input: AppointmentInput) -> StoreResult<StoredAppointment>;
    async fn update_appointment(&self, id: Uuid, input: AppointmentInput) -> StoreResult<Option<StoredAppointment>>;
    async fn delete_appointment(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait RevenueStore: Send + Sync {
    async fn list_revenue(&self) -> StoreResult<Vec<Revenue>>;
    async fn create_revenue(&self, input: RevenueInput) -> StoreResult<Revenue>;
    async fn update_revenue(&self, id: Uuid, input: RevenueInput) -> StoreResult<Option<Revenue>>;
    async fn delete_revenue(&self, id: Uuid) -> StoreResult<bool>;
    /// Clears `appointment_id` on revenue rows pointing at `appointment_id`.
    async fn detach_appointment(&self, appointment_id: Uuid) -> StoreResult<u64>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, id: Uuid) -> StoreResult<Option<Profile>>;
    async fn find_profile_by_email(&self, email: &str) -> StoreResult<Option<Profile>>;
    async fn list_profiles(&self, role: Option<Role>) -> StoreResult<Vec<Profile>>;
    async fn count_by_role(&self, role: Role) -> StoreResult<i64>;
    /// Returns false when no profile with `id` exists.
    async fn update_role(&self, id: Uuid, role: Role) -> StoreResult<bool>;
    async fn upsert_profile(&self, profile: Profile) -> StoreResult<()>;
    async fn delete_profile(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: NewAuditEntry) -> StoreResult<AuditLogEntry>;
    async fn recent_entries(&self, limit: i64) -> StoreResult<Vec<AuditLogEntry>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn create_account(&self, email: &str, password_hash: &str) -> StoreResult<Uuid>;
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>>;
    async fn delete_account(&self, id: Uuid) -> StoreResult<bool>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, user_id: Uuid, token_hash: &str, expires_at: DateTime<Utc>) -> StoreResult<()>;
    /// Resolves an unexpired session to its user.
    async fn resolve_session(&self, token_hash: &str) -> StoreResult<Option<Uuid>>;
}

/// Every port at once, so application state can hold a single backend.
pub trait ClinicStore:
    PatientStore + AppointmentStore + RevenueStore + ProfileStore + AuditStore + AccountStore + SessionStore
{
}

impl<T> ClinicStore for T where
    T: PatientStore + AppointmentStore + RevenueStore + ProfileStore + AuditStore + AccountStore + SessionStore
{
}
