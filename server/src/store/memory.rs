use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{
    AccountStore, AppointmentStore, AuditStore, PatientStore, ProfileStore, RevenueStore,
    SessionStore, StoreError, StoreResult,
};
use crate::models::{
    Account, AppointmentInput, AuditLogEntry, NewAuditEntry, Patient, PatientInput, PatientOrder,
    Profile, Revenue, RevenueInput, Role, StoredAppointment,
};

#[derive(Default)]
struct Tables {
    patients: HashMap<Uuid, Patient>,
    appointments: HashMap<Uuid, StoredAppointment>,
    revenue: HashMap<Uuid, Revenue>,
    profiles: HashMap<Uuid, Profile>,
    audit: Vec<AuditLogEntry>,
    accounts: HashMap<Uuid, Account>,
    sessions: HashMap<String, (Uuid, DateTime<Utc>)>,
}

/// In-process store with the same semantics as `Database`.
///
/// Writes can be made to fail on demand so callers' compensation paths
/// are observable.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing_role_writes: Mutex<HashSet<(Uuid, Role)>>,
    fail_audit: AtomicBool,
    fail_profile_upsert: AtomicBool,
    fail_account_delete: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn seed_profile(&self, profile: Profile) {
        self.tables().profiles.insert(profile.id, profile);
    }

    pub fn role_of(&self, id: Uuid) -> Option<Role> {
        self.tables().profiles.get(&id).map(|p| p.role)
    }

    pub fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.tables().audit.clone()
    }

    pub fn account_count(&self) -> usize {
        self.tables().accounts.len()
    }

    /// Makes every later `update_role(id, role)` call fail.
    pub fn fail_role_write(&self, id: Uuid, role: Role) {
        self.failing_role_writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert((id, role));
    }

    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit.store(fail, Ordering::SeqCst);
    }

    pub fn fail_profile_upserts(&self, fail: bool) {
        self.fail_profile_upsert.store(fail, Ordering::SeqCst);
    }

    pub fn fail_account_deletes(&self, fail: bool) {
        self.fail_account_delete.store(fail, Ordering::SeqCst);
    }
}

fn matches_search(patient: &Patient, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    [
        Some(patient.first_name.as_str()),
        Some(patient.last_name.as_str()),
        patient.email.as_deref(),
        Some(patient.phone.as_str()),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(&needle))
}

#[async_trait]
impl PatientStore for MemoryStore {
    async fn list_patients(&self, search: Option<&str>, order: PatientOrder) -> StoreResult<Vec<Patient>> {
        let mut patients: Vec<Patient> = self
            .tables()
            .patients
            .values()
            .filter(|p| search.map_or(true, |s| matches_search(p, s)))
            .cloned()
            .collect();

        match order {
            PatientOrder::Newest => patients.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            PatientOrder::Oldest => patients.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        }
        Ok(patients)
    }

    async fn get_patient(&self, id: Uuid) -> StoreResult<Option<Patient>> {
        Ok(self.tables().patients.get(&id).cloned())
    }

    async fn create_patient(&self, input: PatientInput) -> StoreResult<Patient> {
        let patient = Patient {
            id: Uuid::new_v4(),
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
            phone: input.phone,
            date_of_birth: input.date_of_birth,
            gender: input.gender,
            address: input.address,
            created_at: Utc::now(),
        };
        self.tables().patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn update_patient(&self, id: Uuid, input: PatientInput) -> StoreResult<Option<Patient>> {
        let mut tables = self.tables();
        let Some(existing) = tables.patients.get_mut(&id) else {
            return Ok(None);
        };
        existing.first_name = input.first_name;
        existing.last_name = input.last_name;
        existing.email = input.email;
        existing.phone = input.phone;
        existing.date_of_birth = input.date_of_birth;
        existing.gender = input.gender;
        existing.address = input.address;
        Ok(Some(existing.clone()))
    }

    async fn delete_patient(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables();
        let removed = tables.patients.remove(&id).is_some();
        if removed {
            tables.appointments.retain(|_, a| a.patient_id != id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl AppointmentStore for MemoryStore {
    async fn list_appointments(&self, start: NaiveDateTime, end: NaiveDateTime) -> StoreResult<Vec<StoredAppointment>> {
        let mut appointments: Vec<StoredAppointment> = self
            .tables()
            .appointments
            .values()
            .filter(|a| a.start_at >= start && a.start_at <= end)
            .cloned()
            .collect();
        appointments.sort_by_key(|a| a.start_at);
        Ok(appointments)
    }

    async fn all_appointments(&self) -> StoreResult<Vec<StoredAppointment>> {
        let mut appointments: Vec<StoredAppointment> =
            self.tables().appointments.values().cloned().collect();
        appointments.sort_by_key(|a| a.start_at);
        Ok(appointments)
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Option<StoredAppointment>> {
        Ok(self.tables().appointments.get(&id).cloned())
    }

    async fn create_appointment(&self, input: AppointmentInput) -> StoreResult<StoredAppointment> {
        let mut tables = self.tables();
        if !tables.patients.contains_key(&input.patient_id) {
            return Err(StoreError::Backend(format!("patient {} does not exist", input.patient_id)));
        }
        let appointment = input.into_stored(Uuid::new_v4());
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn update_appointment(&self, id: Uuid, input: AppointmentInput) -> StoreResult<Option<StoredAppointment>> {
        let mut tables = self.tables();
        if !tables.appointments.contains_key(&id) {
            return Ok(None);
        }
        let appointment = input.into_stored(id);
        tables.appointments.insert(id, appointment.clone());
        Ok(Some(appointment))
    }

    async fn delete_appointment(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables().appointments.remove(&id).is_some())
    }
}

#[async_trait]
impl RevenueStore for MemoryStore {
    async fn list_revenue(&self) -> StoreResult<Vec<Revenue>> {
        let mut rows: Vec<Revenue> = self.tables().revenue.values().cloned().collect();
        rows.sort_by(|a, b| b.transaction_date.cmp(&a.transaction_date));
        Ok(rows)
    }

    async fn create_revenue(&self, input: RevenueInput) -> StoreResult<Revenue> {
        let revenue = input.into_revenue(Uuid::new_v4());
        self.tables().revenue.insert(revenue.id, revenue.clone());
        Ok(revenue)
    }

    async fn update_revenue(&self, id: Uuid, input: RevenueInput) -> StoreResult<Option<Revenue>> {
        let mut tables = self.tables();
        if !tables.revenue.contains_key(&id) {
            return Ok(None);
        }
        let revenue = input.into_revenue(id);
        tables.revenue.insert(id, revenue.clone());
        Ok(Some(revenue))
    }

    async fn delete_revenue(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables().revenue.remove(&id).is_some())
    }

    async fn detach_appointment(&self, appointment_id: Uuid) -> StoreResult<u64> {
        let mut detached = 0;
        for row in self.tables().revenue.values_mut() {
            if row.appointment_id == Some(appointment_id) {
                row.appointment_id = None;
                detached += 1;
            }
        }
        Ok(detached)
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        Ok(self.tables().profiles.get(&id).cloned())
    }

    async fn find_profile_by_email(&self, email: &str) -> StoreResult<Option<Profile>> {
        Ok(self
            .tables()
            .profiles
            .values()
            .find(|p| p.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_profiles(&self, role: Option<Role>) -> StoreResult<Vec<Profile>> {
        let mut profiles: Vec<Profile> = self
            .tables()
            .profiles
            .values()
            .filter(|p| role.map_or(true, |r| p.role == r))
            .cloned()
            .collect();
        profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(profiles)
    }

    async fn count_by_role(&self, role: Role) -> StoreResult<i64> {
        Ok(self.tables().profiles.values().filter(|p| p.role == role).count() as i64)
    }

    async fn update_role(&self, id: Uuid, role: Role) -> StoreResult<bool> {
        let failing = self
            .failing_role_writes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&(id, role));
        if failing {
            return Err(StoreError::Backend(format!("write of role {} for {} rejected", role, id)));
        }

        match self.tables().profiles.get_mut(&id) {
            Some(profile) => {
                profile.role = role;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn upsert_profile(&self, profile: Profile) -> StoreResult<()> {
        if self.fail_profile_upsert.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("profile write rejected".to_string()));
        }
        self.tables().profiles.insert(profile.id, profile);
        Ok(())
    }

    async fn delete_profile(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.tables().profiles.remove(&id).is_some())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append(&self, entry: NewAuditEntry) -> StoreResult<AuditLogEntry> {
        if self.fail_audit.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("audit log unavailable".to_string()));
        }
        let entry = AuditLogEntry::from_new(Uuid::new_v4(), entry, Utc::now());
        self.tables().audit.push(entry.clone());
        Ok(entry)
    }

    async fn recent_entries(&self, limit: i64) -> StoreResult<Vec<AuditLogEntry>> {
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self.tables().audit.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, email: &str, password_hash: &str) -> StoreResult<Uuid> {
        let mut tables = self.tables();
        if tables.accounts.values().any(|a| a.email.eq_ignore_ascii_case(email)) {
            return Err(StoreError::Backend(format!("account for {} already exists", email)));
        }
        let id = Uuid::new_v4();
        tables.accounts.insert(
            id,
            Account {
                id,
                email: email.to_string(),
                password_hash: password_hash.to_string(),
            },
        );
        Ok(id)
    }

    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        Ok(self
            .tables()
            .accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn delete_account(&self, id: Uuid) -> StoreResult<bool> {
        if self.fail_account_delete.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("account deletion rejected".to_string()));
        }
        Ok(self.tables().accounts.remove(&id).is_some())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, user_id: Uuid, token_hash: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        self.tables()
            .sessions
            .insert(token_hash.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn resolve_session(&self, token_hash: &str) -> StoreResult<Option<Uuid>> {
        Ok(self
            .tables()
            .sessions
            .get(token_hash)
            .filter(|(_, expires_at)| *expires_at > Utc::now())
            .map(|(user_id, _)| *user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn patient_input(first: &str, last: &str) -> PatientInput {
        PatientInput {
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: Some(format!("{}@example.com", first.to_lowercase())),
            phone: "0812000".to_string(),
            date_of_birth: None,
            gender: None,
            address: None,
        }
    }

    #[tokio::test]
    async fn test_search_matches_any_field_case_insensitively() {
        let store = MemoryStore::new();
        store.create_patient(patient_input("Siti", "Rahma")).await.unwrap();
        store.create_patient(patient_input("Andi", "Wijaya")).await.unwrap();

        let found = store.list_patients(Some("WIJ"), PatientOrder::Newest).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].first_name, "Andi");

        let by_email = store.list_patients(Some("siti@"), PatientOrder::Oldest).await.unwrap();
        assert_eq!(by_email.len(), 1);
    }

    #[tokio::test]
    async fn test_detach_appointment_clears_references() {
        let store = MemoryStore::new();
        let appointment_id = Uuid::new_v4();
        let input = RevenueInput {
            amount: 150_000.0,
            payment_method: "cash".to_string(),
            status: crate::models::RevenueStatus::Completed,
            transaction_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            notes: None,
            appointment_id: Some(appointment_id),
        };
        store.create_revenue(input.clone()).await.unwrap();
        store.create_revenue(input).await.unwrap();

        assert_eq!(store.detach_appointment(appointment_id).await.unwrap(), 2);
        assert!(store
            .list_revenue()
            .await
            .unwrap()
            .iter()
            .all(|r| r.appointment_id.is_none()));
    }

    #[tokio::test]
    async fn test_failing_role_write_leaves_profile_untouched() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        store.seed_profile(Profile::new(id, "a@example.com", Role::Admin));
        store.fail_role_write(id, Role::Superadmin);

        assert!(store.update_role(id, Role::Superadmin).await.is_err());
        assert_eq!(store.role_of(id), Some(Role::Admin));
        assert!(!store.update_role(Uuid::new_v4(), Role::Admin).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_sessions_do_not_resolve() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store
            .create_session(user, "live", Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        store
            .create_session(user, "stale", Utc::now() - chrono::Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(store.resolve_session("live").await.unwrap(), Some(user));
        assert_eq!(store.resolve_session("stale").await.unwrap(), None);
    }
}
