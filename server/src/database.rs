//! Postgres implementation of every store port.
//!
//! Queries are runtime-checked (`sqlx::query_as`, not `query!`) so building
//! the crate never needs a live database. Rows land in `FromRow` structs and
//! are converted into domain types; enum columns that fail to parse surface
//! as `StoreError::Corrupt`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::models::{
    Account, AppointmentInput, AuditLogEntry, NewAuditEntry, Patient, PatientInput, PatientOrder,
    Profile, Revenue, RevenueInput, Role, StoredAppointment,
};
use crate::store::{
    AccountStore, AppointmentStore, AuditStore, PatientStore, ProfileStore, RevenueStore,
    SessionStore, StoreError, StoreResult,
};

pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_column<T: std::str::FromStr<Err = String>>(value: &str) -> StoreResult<T> {
    value.parse().map_err(StoreError::Corrupt)
}

const PATIENT_COLUMNS: &str =
    "id, first_name, last_name, email, phone, date_of_birth, gender, address, created_at";

#[derive(Debug, FromRow)]
struct PatientRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    email: Option<String>,
    phone: String,
    date_of_birth: Option<NaiveDate>,
    gender: Option<String>,
    address: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PatientRow> for Patient {
    fn from(row: PatientRow) -> Self {
        Patient {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            date_of_birth: row.date_of_birth,
            gender: row.gender,
            address: row.address,
            created_at: row.created_at,
        }
    }
}

const APPOINTMENT_COLUMNS: &str = "id, patient_id, start_at, duration_minutes, status, notes, cost, \
     treatment_type, frequency, end_date";

#[derive(Debug, FromRow)]
struct AppointmentRow {
    id: Uuid,
    patient_id: Uuid,
    start_at: NaiveDateTime,
    duration_minutes: i32,
    status: String,
    notes: Option<String>,
    cost: Option<f64>,
    treatment_type: String,
    frequency: Option<String>,
    end_date: Option<NaiveDate>,
}

impl TryFrom<AppointmentRow> for StoredAppointment {
    type Error = StoreError;

    fn try_from(row: AppointmentRow) -> StoreResult<Self> {
        Ok(StoredAppointment {
            id: row.id,
            patient_id: row.patient_id,
            start_at: row.start_at,
            duration_minutes: row.duration_minutes,
            status: parse_column(&row.status)?,
            notes: row.notes,
            cost: row.cost,
            treatment_type: parse_column(&row.treatment_type)?,
            // An unrecognised frequency leaves the appointment as a single occurrence.
            frequency: row.frequency.and_then(|f| f.parse().ok()),
            end_date: row.end_date,
        })
    }
}

const REVENUE_COLUMNS: &str =
    "id, amount, payment_method, status, transaction_date, notes, appointment_id";

#[derive(Debug, FromRow)]
struct RevenueRow {
    id: Uuid,
    amount: f64,
    payment_method: String,
    status: String,
    transaction_date: NaiveDate,
    notes: Option<String>,
    appointment_id: Option<Uuid>,
}

impl TryFrom<RevenueRow> for Revenue {
    type Error = StoreError;

    fn try_from(row: RevenueRow) -> StoreResult<Self> {
        Ok(Revenue {
            id: row.id,
            amount: row.amount,
            payment_method: row.payment_method,
            status: parse_column(&row.status)?,
            transaction_date: row.transaction_date,
            notes: row.notes,
            appointment_id: row.appointment_id,
        })
    }
}

const PROFILE_COLUMNS: &str =
    "id, email, first_name, last_name, clinic_name, phone, role, approved, invited_by, created_at";

#[derive(Debug, FromRow)]
struct ProfileRow {
    id: Uuid,
    email: String,
    first_name: Option<String>,
    last_name: Option<String>,
    clinic_name: Option<String>,
    phone: Option<String>,
    role: String,
    approved: bool,
    invited_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = StoreError;

    fn try_from(row: ProfileRow) -> StoreResult<Self> {
        Ok(Profile {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            clinic_name: row.clinic_name,
            phone: row.phone,
            role: parse_column(&row.role)?,
            approved: row.approved,
            invited_by: row.invited_by,
            created_at: row.created_at,
        })
    }
}

const AUDIT_COLUMNS: &str =
    "id, actor_id, action, target_id, previous_role, new_role, details, created_at";

#[derive(Debug, FromRow)]
struct AuditRow {
    id: Uuid,
    actor_id: Uuid,
    action: String,
    target_id: Uuid,
    previous_role: Option<String>,
    new_role: Option<String>,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditLogEntry {
    fn from(row: AuditRow) -> Self {
        AuditLogEntry {
            id: row.id,
            actor_id: row.actor_id,
            action: row.action,
            target_id: row.target_id,
            previous_role: row.previous_role,
            new_role: row.new_role,
            details: row.details,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    password_hash: String,
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[async_trait]
impl PatientStore for Database {
    async fn list_patients(&self, search: Option<&str>, order: PatientOrder) -> StoreResult<Vec<Patient>> {
        let direction = match order {
            PatientOrder::Newest => "DESC",
            PatientOrder::Oldest => "ASC",
        };
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let sql = format!(
            "SELECT {PATIENT_COLUMNS} FROM patients
             WHERE $1::text IS NULL
                OR first_name ILIKE $1 OR last_name ILIKE $1
                OR email ILIKE $1 OR phone ILIKE $1
             ORDER BY created_at {direction}"
        );
        let rows = sqlx::query_as::<_, PatientRow>(&sql)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!("Listed {} patients", rows.len());
        Ok(rows.into_iter().map(Patient::from).collect())
    }

    async fn get_patient(&self, id: Uuid) -> StoreResult<Option<Patient>> {
        let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = $1");
        let row = sqlx::query_as::<_, PatientRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Patient::from))
    }

    async fn create_patient(&self, input: PatientInput) -> StoreResult<Patient> {
        let sql = format!(
            "INSERT INTO patients (id, first_name, last_name, email, phone, date_of_birth, gender, address)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {PATIENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PatientRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.first_name)
            .bind(input.last_name)
            .bind(input.email)
            .bind(input.phone)
            .bind(input.date_of_birth)
            .bind(input.gender)
            .bind(input.address)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn update_patient(&self, id: Uuid, input: PatientInput) -> StoreResult<Option<Patient>> {
        let sql = format!(
            "UPDATE patients
             SET first_name = $2, last_name = $3, email = $4, phone = $5,
                 date_of_birth = $6, gender = $7, address = $8
             WHERE id = $1
             RETURNING {PATIENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PatientRow>(&sql)
            .bind(id)
            .bind(input.first_name)
            .bind(input.last_name)
            .bind(input.email)
            .bind(input.phone)
            .bind(input.date_of_birth)
            .bind(input.gender)
            .bind(input.address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Patient::from))
    }

    async fn delete_patient(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM patients WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AppointmentStore for Database {
    async fn list_appointments(&self, start: NaiveDateTime, end: NaiveDateTime) -> StoreResult<Vec<StoredAppointment>> {
        let sql = format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments
             WHERE start_at >= $1 AND start_at <= $2
             ORDER BY start_at"
        );
        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        tracing::debug!("Loaded {} appointments between {} and {}", rows.len(), start, end);
        convert_all(rows)
    }

    async fn all_appointments(&self) -> StoreResult<Vec<StoredAppointment>> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments ORDER BY start_at");
        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<StoredAppointment>> {
        let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = $1");
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(StoredAppointment::try_from).transpose()
    }

    async fn create_appointment(&self, input: AppointmentInput) -> StoreResult<StoredAppointment> {
        let sql = format!(
            "INSERT INTO appointments
                (id, patient_id, start_at, duration_minutes, status, notes, cost,
                 treatment_type, frequency, end_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {APPOINTMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.patient_id)
            .bind(input.start_at)
            .bind(input.duration_minutes)
            .bind(input.status.as_str())
            .bind(input.notes)
            .bind(input.cost)
            .bind(input.treatment_type.as_str())
            .bind(input.frequency.map(|f| f.as_str()))
            .bind(input.end_date)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn update_appointment(&self, id: Uuid, input: AppointmentInput) -> StoreResult<Option<StoredAppointment>> {
        let sql = format!(
            "UPDATE appointments
             SET patient_id = $2, start_at = $3, duration_minutes = $4, status = $5,
                 notes = $6, cost = $7, treatment_type = $8, frequency = $9, end_date = $10
             WHERE id = $1
             RETURNING {APPOINTMENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .bind(input.patient_id)
            .bind(input.start_at)
            .bind(input.duration_minutes)
            .bind(input.status.as_str())
            .bind(input.notes)
            .bind(input.cost)
            .bind(input.treatment_type.as_str())
            .bind(input.frequency.map(|f| f.as_str()))
            .bind(input.end_date)
            .fetch_optional(&self.pool)
            .await?;
        row.map(StoredAppointment::try_from).transpose()
    }

    async fn delete_appointment(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RevenueStore for Database {
    async fn list_revenue(&self) -> StoreResult<Vec<Revenue>> {
        let sql = format!("SELECT {REVENUE_COLUMNS} FROM revenue ORDER BY transaction_date DESC");
        let rows = sqlx::query_as::<_, RevenueRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn create_revenue(&self, input: RevenueInput) -> StoreResult<Revenue> {
        let sql = format!(
            "INSERT INTO revenue (id, amount, payment_method, status, transaction_date, notes, appointment_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {REVENUE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, RevenueRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(input.amount)
            .bind(input.payment_method)
            .bind(input.status.as_str())
            .bind(input.transaction_date)
            .bind(input.notes)
            .bind(input.appointment_id)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn update_revenue(&self, id: Uuid, input: RevenueInput) -> StoreResult<Option<Revenue>> {
        let sql = format!(
            "UPDATE revenue
             SET amount = $2, payment_method = $3, status = $4, transaction_date = $5,
                 notes = $6, appointment_id = $7
             WHERE id = $1
             RETURNING {REVENUE_COLUMNS}"
        );
        let row = sqlx::query_as::<_, RevenueRow>(&sql)
            .bind(id)
            .bind(input.amount)
            .bind(input.payment_method)
            .bind(input.status.as_str())
            .bind(input.transaction_date)
            .bind(input.notes)
            .bind(input.appointment_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Revenue::try_from).transpose()
    }

    async fn delete_revenue(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM revenue WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn detach_appointment(&self, appointment_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE revenue SET appointment_id = NULL WHERE appointment_id = $1")
            .bind(appointment_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ProfileStore for Database {
    async fn get_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1");
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Profile::try_from).transpose()
    }

    async fn find_profile_by_email(&self, email: &str) -> StoreResult<Option<Profile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE LOWER(email) = LOWER($1)");
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Profile::try_from).transpose()
    }

    async fn list_profiles(&self, role: Option<Role>) -> StoreResult<Vec<Profile>> {
        let sql = format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles
             WHERE $1::text IS NULL OR role = $1
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(role.map(|r| r.as_str()))
            .fetch_all(&self.pool)
            .await?;
        convert_all(rows)
    }

    async fn count_by_role(&self, role: Role) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM profiles WHERE role = $1")
            .bind(role.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn update_role(&self, id: Uuid, role: Role) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE profiles SET role = $2 WHERE id = $1")
            .bind(id)
            .bind(role.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_profile(&self, profile: Profile) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO profiles
                (id, email, first_name, last_name, clinic_name, phone, role, approved, invited_by, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (id) DO UPDATE SET
                email = EXCLUDED.email,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                clinic_name = EXCLUDED.clinic_name,
                phone = EXCLUDED.phone,
                role = EXCLUDED.role,
                approved = EXCLUDED.approved,
                invited_by = EXCLUDED.invited_by",
        )
        .bind(profile.id)
        .bind(profile.email)
        .bind(profile.first_name)
        .bind(profile.last_name)
        .bind(profile.clinic_name)
        .bind(profile.phone)
        .bind(profile.role.as_str())
        .bind(profile.approved)
        .bind(profile.invited_by)
        .bind(profile.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_profile(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuditStore for Database {
    async fn append(&self, entry: NewAuditEntry) -> StoreResult<AuditLogEntry> {
        let sql = format!(
            "INSERT INTO admin_audit_log (id, actor_id, action, target_id, previous_role, new_role, details)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {AUDIT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, AuditRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(entry.actor_id)
            .bind(entry.action)
            .bind(entry.target_id)
            .bind(entry.previous_role)
            .bind(entry.new_role)
            .bind(entry.details)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn recent_entries(&self, limit: i64) -> StoreResult<Vec<AuditLogEntry>> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM admin_audit_log ORDER BY created_at DESC LIMIT $1");
        let rows = sqlx::query_as::<_, AuditRow>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(AuditLogEntry::from).collect())
    }
}

#[async_trait]
impl AccountStore for Database {
    async fn create_account(&self, email: &str, password_hash: &str) -> StoreResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            "INSERT INTO accounts (id, email, password_hash) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            "SELECT id, email, password_hash FROM accounts WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| Account {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
        }))
    }

    async fn delete_account(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn create_session(&self, user_id: Uuid, token_hash: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("INSERT INTO auth_sessions (token_hash, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(token_hash)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn resolve_session(&self, token_hash: &str) -> StoreResult<Option<Uuid>> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM auth_sessions WHERE token_hash = $1 AND expires_at > NOW()",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user_id)
    }
}
