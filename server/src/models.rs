use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Administrative role held by a dashboard user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Superadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "superadmin" => Ok(Role::Superadmin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            other => Err(format!("unknown appointment status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreatmentType {
    #[serde(rename = "one-time")]
    OneTime,
    #[serde(rename = "ongoing")]
    Ongoing,
}

impl TreatmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TreatmentType::OneTime => "one-time",
            TreatmentType::Ongoing => "ongoing",
        }
    }
}

impl FromStr for TreatmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "one-time" => Ok(TreatmentType::OneTime),
            "ongoing" => Ok(TreatmentType::Ongoing),
            other => Err(format!("unknown treatment type '{}'", other)),
        }
    }
}

/// Repeat period of an ongoing appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "yearly" => Ok(Frequency::Yearly),
            other => Err(format!("unknown frequency '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevenueStatus {
    Completed,
    Pending,
    Cancelled,
}

impl RevenueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevenueStatus::Completed => "completed",
            RevenueStatus::Pending => "pending",
            RevenueStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for RevenueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(RevenueStatus::Completed),
            "pending" => Ok(RevenueStatus::Pending),
            "cancelled" => Ok(RevenueStatus::Cancelled),
            other => Err(format!("unknown revenue status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub email: Option<String>,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Writable patient fields, used for create and full replace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientInput {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    pub phone: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

impl PatientInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.first_name.trim().is_empty() {
            return Err("first_name is required".to_string());
        }
        if self.last_name.trim().is_empty() {
            return Err("last_name is required".to_string());
        }
        if self.phone.trim().is_empty() {
            return Err("phone is required".to_string());
        }
        Ok(())
    }
}

impl From<Patient> for PatientInput {
    fn from(patient: Patient) -> Self {
        Self {
            first_name: patient.first_name,
            last_name: patient.last_name,
            email: patient.email,
            phone: patient.phone,
            date_of_birth: patient.date_of_birth,
            gender: patient.gender,
            address: patient.address,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatientOrder {
    #[default]
    Newest,
    Oldest,
}

/// An appointment row as persisted. Ongoing rows describe a whole series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAppointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub start_at: NaiveDateTime,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    pub treatment_type: TreatmentType,
    #[serde(default)]
    pub frequency: Option<Frequency>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentInput {
    pub patient_id: Uuid,
    pub start_at: NaiveDateTime,
    #[serde(default = "default_duration")]
    pub duration_minutes: i32,
    #[serde(default = "default_status")]
    pub status: AppointmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default = "default_treatment")]
    pub treatment_type: TreatmentType,
    #[serde(default)]
    pub frequency: Option<Frequency>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

fn default_duration() -> i32 {
    30
}

fn default_status() -> AppointmentStatus {
    AppointmentStatus::Scheduled
}

fn default_treatment() -> TreatmentType {
    TreatmentType::OneTime
}

impl AppointmentInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.duration_minutes <= 0 {
            return Err("duration_minutes must be positive".to_string());
        }
        if let Some(cost) = self.cost {
            if cost < 0.0 {
                return Err("cost must not be negative".to_string());
            }
        }
        if let Some(end) = self.end_date {
            if end < self.start_at.date() {
                return Err("end_date must not be before the appointment date".to_string());
            }
        }
        Ok(())
    }

    pub fn into_stored(self, id: Uuid) -> StoredAppointment {
        StoredAppointment {
            id,
            patient_id: self.patient_id,
            start_at: self.start_at,
            duration_minutes: self.duration_minutes,
            status: self.status,
            notes: self.notes,
            cost: self.cost,
            treatment_type: self.treatment_type,
            frequency: self.frequency,
            end_date: self.end_date,
        }
    }
}

/// One concrete calendar instance of a stored appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentOccurrence {
    pub source_id: Uuid,
    pub occurrence_id: String,
    pub start_at: NaiveDateTime,
    pub patient_id: Uuid,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub cost: Option<f64>,
    pub treatment_type: TreatmentType,
    pub frequency: Option<Frequency>,
    pub end_date: Option<NaiveDate>,
}

impl AppointmentOccurrence {
    pub fn anchor(appointment: &StoredAppointment) -> Self {
        Self::at(appointment, appointment.id.to_string(), appointment.start_at)
    }

    pub fn at(appointment: &StoredAppointment, occurrence_id: String, start_at: NaiveDateTime) -> Self {
        Self {
            source_id: appointment.id,
            occurrence_id,
            start_at,
            patient_id: appointment.patient_id,
            duration_minutes: appointment.duration_minutes,
            status: appointment.status,
            notes: appointment.notes.clone(),
            cost: appointment.cost,
            treatment_type: appointment.treatment_type,
            frequency: appointment.frequency,
            end_date: appointment.end_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revenue {
    pub id: Uuid,
    pub amount: f64,
    pub payment_method: String,
    pub status: RevenueStatus,
    pub transaction_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueInput {
    pub amount: f64,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    #[serde(default = "default_revenue_status")]
    pub status: RevenueStatus,
    pub transaction_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
}

fn default_payment_method() -> String {
    "cash".to_string()
}

fn default_revenue_status() -> RevenueStatus {
    RevenueStatus::Completed
}

impl RevenueInput {
    pub fn validate(&self) -> Result<(), String> {
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err("amount must be a non-negative number".to_string());
        }
        Ok(())
    }

    pub fn into_revenue(self, id: Uuid) -> Revenue {
        Revenue {
            id,
            amount: self.amount,
            payment_method: self.payment_method,
            status: self.status,
            transaction_date: self.transaction_date,
            notes: self.notes,
            appointment_id: self.appointment_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub clinic_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: Role,
    pub approved: bool,
    #[serde(default)]
    pub invited_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(id: Uuid, email: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            email: email.into(),
            first_name: None,
            last_name: None,
            clinic_name: None,
            phone: None,
            role,
            approved: true,
            invited_by: None,
            created_at: Utc::now(),
        }
    }
}

/// Actions recorded by the server itself. Manual entries may carry any action name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    RoleTransfer,
    UpdateRole,
    DeleteUser,
    InviteUser,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::RoleTransfer => "role_transfer",
            AuditAction::UpdateRole => "update_role",
            AuditAction::DeleteUser => "delete_user",
            AuditAction::InviteUser => "invite_user",
        }
    }
}

/// Audit record before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub actor_id: Uuid,
    pub action: String,
    pub target_id: Uuid,
    pub previous_role: Option<String>,
    pub new_role: Option<String>,
    pub details: serde_json::Value,
}

impl NewAuditEntry {
    pub fn new(actor_id: Uuid, action: AuditAction, target_id: Uuid) -> Self {
        Self {
            actor_id,
            action: action.as_str().to_string(),
            target_id,
            previous_role: None,
            new_role: None,
            details: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_roles(mut self, previous: Option<Role>, new: Role) -> Self {
        self.previous_role = previous.map(|r| r.as_str().to_string());
        self.new_role = Some(new.as_str().to_string());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub target_id: Uuid,
    pub previous_role: Option<String>,
    pub new_role: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn from_new(id: Uuid, entry: NewAuditEntry, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            actor_id: entry.actor_id,
            action: entry.action,
            target_id: entry.target_id,
            previous_role: entry.previous_role,
            new_role: entry.new_role,
            details: entry.details,
            created_at,
        }
    }
}

/// Login credentials row. Only the password hash is ever stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
}
