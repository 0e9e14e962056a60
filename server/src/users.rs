//! Dashboard user administration: invitations, deletions and manual audit entries.

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::auth::hash_password;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{AuditAction, AuditLogEntry, NewAuditEntry, Profile, Role};
use crate::roles::RoleCoordinator;
use crate::store::{AccountStore, AuditStore, ClinicStore, ProfileStore, StoreError};

pub const TEMPORARY_PASSWORD_LENGTH: usize = 12;

const PASSWORD_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*";

fn email_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().map_or(false, |pattern| pattern.is_match(email))
}

pub fn generate_temporary_password() -> String {
    let mut rng = rand::thread_rng();
    (0..TEMPORARY_PASSWORD_LENGTH)
        .map(|_| PASSWORD_CHARSET[rng.gen_range(0..PASSWORD_CHARSET.len())] as char)
        .collect()
}

/// Credentials for a freshly invited admin. Shown to the inviting superadmin once.
#[derive(Debug, Clone, Serialize)]
pub struct Invitation {
    pub user_id: Uuid,
    pub email: String,
    pub temporary_password: String,
}

/// Body of a manually logged audit entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditRequest {
    #[serde(default)]
    pub action: String,
    pub target_user_id: Option<Uuid>,
    pub previous_role: Option<String>,
    pub new_role: Option<String>,
    pub details: Option<Value>,
}

pub struct UserManager {
    store: Arc<dyn ClinicStore>,
    roles: Arc<RoleCoordinator>,
    password_iterations: u32,
}

impl UserManager {
    pub fn new(store: Arc<dyn ClinicStore>, roles: Arc<RoleCoordinator>, password_iterations: u32) -> Self {
        Self {
            store,
            roles,
            password_iterations,
        }
    }

    pub async fn invite(&self, actor_id: Uuid, email: &str) -> ClinicResult<Invitation> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ClinicError::invalid("Email is required"));
        }
        if !is_valid_email(email) {
            return Err(ClinicError::invalid("Invalid email format"));
        }
        if self.store.find_profile_by_email(email).await?.is_some() {
            return Err(ClinicError::invalid("User with this email already exists"));
        }

        let temporary_password = generate_temporary_password();
        let iterations = self.password_iterations;
        let password = temporary_password.clone();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, iterations))
            .await
            .map_err(|e| StoreError::Backend(format!("password hashing task failed: {}", e)))?;

        let user_id = self.store.create_account(email, &password_hash).await?;

        let mut profile = Profile::new(user_id, email, Role::Admin);
        profile.invited_by = Some(actor_id);
        if let Err(e) = self.store.upsert_profile(profile).await {
            if let Err(cleanup) = self.store.delete_account(user_id).await {
                tracing::warn!("Could not remove account {} after failed invite: {}", user_id, cleanup);
            }
            return Err(e.into());
        }

        let entry = NewAuditEntry::new(actor_id, AuditAction::InviteUser, user_id)
            .with_roles(None, Role::Admin)
            .with_details(json!({
                "email": email,
                "role": Role::Admin,
                "invited_by": actor_id,
            }));
        if let Err(e) = self.store.append(entry).await {
            tracing::warn!("Failed to write invite_user audit entry: {}", e);
        }

        tracing::info!("✓ Invited {} as admin ({})", email, user_id);
        Ok(Invitation {
            user_id,
            email: email.to_string(),
            temporary_password,
        })
    }

    /// Creates the first superadmin when none exists yet. Returns the new
    /// superadmin's id, or `None` when one was already present.
    pub async fn bootstrap_superadmin(&self, email: &str, password: &str) -> ClinicResult<Option<Uuid>> {
        let _guard = self.roles.lock_roles().await;
        if self.store.count_by_role(Role::Superadmin).await? > 0 {
            return Ok(None);
        }
        let email = email.trim();
        if !is_valid_email(email) {
            return Err(ClinicError::invalid("Invalid bootstrap superadmin email"));
        }
        if password.len() < 8 {
            return Err(ClinicError::invalid("Bootstrap superadmin password must be at least 8 characters"));
        }

        if let Some(existing) = self.store.find_profile_by_email(email).await? {
            self.store.update_role(existing.id, Role::Superadmin).await?;
            tracing::info!("✓ Promoted existing user {} to superadmin", existing.id);
            return Ok(Some(existing.id));
        }

        let iterations = self.password_iterations;
        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, iterations))
            .await
            .map_err(|e| StoreError::Backend(format!("password hashing task failed: {}", e)))?;
        let user_id = self.store.create_account(email, &password_hash).await?;
        self.store
            .upsert_profile(Profile::new(user_id, email, Role::Superadmin))
            .await?;

        tracing::info!("✓ Bootstrapped superadmin {} ({})", email, user_id);
        Ok(Some(user_id))
    }

    /// Removes a non-superadmin user. The role check and the profile delete
    /// happen under the role lock so a concurrent promotion cannot slip between them.
    pub async fn delete(&self, actor_id: Uuid, target_id: Uuid) -> ClinicResult<Profile> {
        if actor_id == target_id {
            return Err(ClinicError::invalid("Cannot delete your own account"));
        }
        let guard = self.roles.lock_roles().await;
        let target = self
            .store
            .get_profile(target_id)
            .await?
            .ok_or_else(|| ClinicError::not_found(format!("No user profile found with ID {}", target_id)))?;
        if target.role == Role::Superadmin {
            return Err(ClinicError::invalid("Cannot delete a superadmin account"));
        }

        self.store.delete_profile(target_id).await?;
        drop(guard);
        if let Err(e) = self.store.delete_account(target_id).await {
            tracing::error!("Profile {} deleted but account removal failed: {}", target_id, e);
            return Err(StoreError::Backend(format!(
                "profile deleted but removing the login account failed: {}",
                e
            ))
            .into());
        }

        let entry = NewAuditEntry::new(actor_id, AuditAction::DeleteUser, target_id).with_details(json!({
            "email": target.email,
            "role": target.role,
        }));
        if let Err(e) = self.store.append(entry).await {
            tracing::warn!("Failed to write delete_user audit entry: {}", e);
        }

        tracing::info!("✓ Deleted user {}", target_id);
        Ok(target)
    }

    pub async fn list(&self, role: Option<Role>) -> ClinicResult<Vec<Profile>> {
        Ok(self.store.list_profiles(role).await?)
    }

    /// Appends a caller-described audit entry. Unlike the entries written as a
    /// side effect of other operations, a failed write is reported.
    pub async fn log_audit(&self, actor_id: Uuid, request: AuditRequest) -> ClinicResult<AuditLogEntry> {
        let action = request.action.trim();
        let Some(target_id) = request.target_user_id.filter(|_| !action.is_empty()) else {
            return Err(ClinicError::invalid("Action and target_user_id are required"));
        };

        let entry = NewAuditEntry {
            actor_id,
            action: action.to_string(),
            target_id,
            previous_role: request.previous_role,
            new_role: request.new_role,
            details: request.details.unwrap_or_else(|| json!({})),
        };
        let stored = self.store.append(entry).await?;
        tracing::info!("✓ Audit entry {} recorded by {}", stored.action, actor_id);
        Ok(stored)
    }

    pub async fn audit_log(&self, limit: i64) -> ClinicResult<Vec<AuditLogEntry>> {
        Ok(self.store.recent_entries(limit.clamp(1, 500)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::store::MemoryStore;

    fn manager() -> (Arc<MemoryStore>, UserManager) {
        let (store, _, users) = manager_with_roles();
        (store, users)
    }

    fn manager_with_roles() -> (Arc<MemoryStore>, Arc<RoleCoordinator>, UserManager) {
        let store = Arc::new(MemoryStore::new());
        let roles = Arc::new(RoleCoordinator::new(store.clone(), store.clone()));
        let users = UserManager::new(store.clone(), roles.clone(), 1_000);
        (store, roles, users)
    }

    fn seed(store: &MemoryStore, email: &str, role: Role) -> Uuid {
        let id = Uuid::new_v4();
        store.seed_profile(Profile::new(id, email, role));
        id
    }

    #[test]
    fn test_temporary_password_shape() {
        for _ in 0..50 {
            let password = generate_temporary_password();
            assert_eq!(password.len(), TEMPORARY_PASSWORD_LENGTH);
            assert!(password.bytes().all(|b| PASSWORD_CHARSET.contains(&b)));
        }
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("nurse@clinic.co.id"));
        assert!(!is_valid_email("nurse@clinic"));
        assert!(!is_valid_email("nurse clinic@x.id"));
        assert!(!is_valid_email("@clinic.id"));
    }

    #[tokio::test]
    async fn test_invite_creates_approved_admin() {
        let (store, users) = manager();
        let actor = seed(&store, "root@clinic.id", Role::Superadmin);

        let invitation = users.invite(actor, " new@clinic.id ").await.unwrap();

        assert_eq!(invitation.email, "new@clinic.id");
        let profile = store.get_profile(invitation.user_id).await.unwrap().unwrap();
        assert_eq!(profile.role, Role::Admin);
        assert!(profile.approved);
        assert_eq!(profile.invited_by, Some(actor));

        let account = store.find_account_by_email("new@clinic.id").await.unwrap().unwrap();
        assert!(verify_password(&invitation.temporary_password, &account.password_hash));

        let audit = store.audit_entries();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, "invite_user");
        assert_eq!(audit[0].details["email"], "new@clinic.id");
    }

    #[tokio::test]
    async fn test_invite_rejects_existing_and_malformed_email() {
        let (store, users) = manager();
        let actor = seed(&store, "root@clinic.id", Role::Superadmin);
        seed(&store, "taken@clinic.id", Role::Admin);

        assert!(matches!(
            users.invite(actor, "taken@clinic.id").await,
            Err(ClinicError::InvalidRequest(_))
        ));
        assert!(matches!(
            users.invite(actor, "not-an-email").await,
            Err(ClinicError::InvalidRequest(_))
        ));
        assert!(matches!(users.invite(actor, "").await, Err(ClinicError::InvalidRequest(_))));
        assert_eq!(store.account_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_profile_write_removes_account() {
        let (store, users) = manager();
        let actor = seed(&store, "root@clinic.id", Role::Superadmin);
        store.fail_profile_upserts(true);

        let result = users.invite(actor, "new@clinic.id").await;

        assert!(matches!(result, Err(ClinicError::Store(_))));
        assert_eq!(store.account_count(), 0);
        assert!(store.audit_entries().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_profile_and_account() {
        let (store, users) = manager();
        let actor = seed(&store, "root@clinic.id", Role::Superadmin);
        let invitation = users.invite(actor, "temp@clinic.id").await.unwrap();

        users.delete(actor, invitation.user_id).await.unwrap();

        assert!(store.get_profile(invitation.user_id).await.unwrap().is_none());
        assert_eq!(store.account_count(), 0);
        let audit = store.audit_entries();
        assert_eq!(audit.last().map(|e| e.action.as_str()), Some("delete_user"));
    }

    #[tokio::test]
    async fn test_delete_guards() {
        let (store, users) = manager();
        let actor = seed(&store, "root@clinic.id", Role::Superadmin);
        let other_superadmin = seed(&store, "co@clinic.id", Role::Superadmin);

        assert!(matches!(users.delete(actor, actor).await, Err(ClinicError::InvalidRequest(_))));
        assert!(matches!(
            users.delete(actor, other_superadmin).await,
            Err(ClinicError::InvalidRequest(_))
        ));
        assert!(matches!(
            users.delete(actor, Uuid::new_v4()).await,
            Err(ClinicError::NotFound(_))
        ));
        assert_eq!(store.role_of(other_superadmin), Some(Role::Superadmin));
    }

    #[tokio::test]
    async fn test_delete_sees_promotion_committed_under_role_lock() {
        let (store, roles, users) = manager_with_roles();
        let users = Arc::new(users);
        let actor = seed(&store, "root@clinic.id", Role::Superadmin);
        let target = seed(&store, "admin@clinic.id", Role::Admin);

        let guard = roles.lock_roles().await;
        let pending = {
            let users = users.clone();
            tokio::spawn(async move { users.delete(actor, target).await })
        };
        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        store.update_role(target, Role::Superadmin).await.unwrap();
        drop(guard);

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(ClinicError::InvalidRequest(_))));
        assert_eq!(store.role_of(target), Some(Role::Superadmin));
        assert!(store.audit_entries().is_empty());
    }

    #[tokio::test]
    async fn test_delete_reports_account_failure_after_profile_removal() {
        let (store, users) = manager();
        let actor = seed(&store, "root@clinic.id", Role::Superadmin);
        let target = seed(&store, "admin@clinic.id", Role::Admin);
        store.fail_account_deletes(true);

        let result = users.delete(actor, target).await;

        assert!(matches!(result, Err(ClinicError::Store(_))));
        assert!(store.get_profile(target).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_manual_audit_requires_fields_and_surfaces_failures() {
        let (store, users) = manager();
        let actor = seed(&store, "root@clinic.id", Role::Admin);
        let target = Uuid::new_v4();
        let request = |action: &str, target_user_id: Option<Uuid>| AuditRequest {
            action: action.to_string(),
            target_user_id,
            ..AuditRequest::default()
        };

        assert!(matches!(
            users.log_audit(actor, request("", Some(target))).await,
            Err(ClinicError::InvalidRequest(_))
        ));
        assert!(matches!(
            users.log_audit(actor, request("export", None)).await,
            Err(ClinicError::InvalidRequest(_))
        ));

        let entry = users
            .log_audit(
                actor,
                AuditRequest {
                    new_role: Some("admin".to_string()),
                    details: Some(json!({"rows": 12})),
                    ..request("export_patients", Some(target))
                },
            )
            .await
            .unwrap();
        assert_eq!(entry.details["rows"], 12);
        assert_eq!(entry.new_role.as_deref(), Some("admin"));

        store.fail_audit_writes(true);
        assert!(matches!(
            users.log_audit(actor, request("export_patients", Some(target))).await,
            Err(ClinicError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_only_when_no_superadmin() {
        let (store, users) = manager();

        let id = users
            .bootstrap_superadmin("owner@clinic.id", "long-enough")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(store.role_of(id), Some(Role::Superadmin));
        let account = store.find_account_by_email("owner@clinic.id").await.unwrap().unwrap();
        assert!(verify_password("long-enough", &account.password_hash));

        let again = users
            .bootstrap_superadmin("other@clinic.id", "long-enough")
            .await
            .unwrap();
        assert_eq!(again, None);
        assert_eq!(store.account_count(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_short_password() {
        let (_, users) = manager();
        assert!(matches!(
            users.bootstrap_superadmin("owner@clinic.id", "short").await,
            Err(ClinicError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_role() {
        let (store, users) = manager();
        seed(&store, "a@clinic.id", Role::Admin);
        seed(&store, "b@clinic.id", Role::Superadmin);

        assert_eq!(users.list(None).await.unwrap().len(), 2);
        let superadmins = users.list(Some(Role::Superadmin)).await.unwrap();
        assert_eq!(superadmins.len(), 1);
        assert_eq!(superadmins[0].email, "b@clinic.id");
    }
}
