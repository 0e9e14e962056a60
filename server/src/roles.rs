//! Superadmin promotion with a fixed cap of two superadmins.
//!
//! When the cap is already reached, promoting someone to superadmin hands the
//! acting superadmin's seat to the target: the actor is demoted first, then the
//! target promoted, and a failed promotion reverts the actor once. The actor's
//! role check, the count read and both writes run under one lock so concurrent
//! requests cannot push the total past the cap or demote the same actor twice.
//! Anything else that must observe a stable role (user deletion, bootstrap)
//! takes the same lock through [`RoleCoordinator::lock_roles`].

use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{ClinicError, ClinicResult, Compensation};
use crate::models::{AuditAction, NewAuditEntry, Role};
use crate::store::{AuditStore, ProfileStore};

/// Maximum number of profiles holding `Role::Superadmin` at once.
pub const SUPERADMIN_CAP: i64 = 2;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PromotionResult {
    /// Only the target's role changed.
    Promoted {
        target_id: Uuid,
        previous_role: Role,
        new_role: Role,
    },
    /// The actor gave up superadmin so the target could take it.
    Transferred {
        actor_id: Uuid,
        target_id: Uuid,
        previous_role: Role,
    },
}

impl PromotionResult {
    pub fn message(&self) -> String {
        match self {
            PromotionResult::Promoted {
                previous_role,
                new_role,
                ..
            } => format!("Role updated successfully from {} to {}", previous_role, new_role),
            PromotionResult::Transferred { target_id, .. } => format!(
                "Role transfer completed: you are now an admin and user {} is now a superadmin",
                target_id
            ),
        }
    }
}

pub struct RoleCoordinator {
    profiles: Arc<dyn ProfileStore>,
    audit: Arc<dyn AuditStore>,
    role_writes: Mutex<()>,
}

impl RoleCoordinator {
    pub fn new(profiles: Arc<dyn ProfileStore>, audit: Arc<dyn AuditStore>) -> Self {
        Self {
            profiles,
            audit,
            role_writes: Mutex::new(()),
        }
    }

    /// Serializes role-sensitive writes. Held for the whole of `promote`.
    pub async fn lock_roles(&self) -> MutexGuard<'_, ()> {
        self.role_writes.lock().await
    }

    /// Sets `target_id`'s role on behalf of superadmin `actor_id`.
    ///
    /// The actor's role is read again once the lock is held: a superadmin
    /// check made at authentication time can be stale by then.
    pub async fn promote(
        &self,
        actor_id: Uuid,
        target_id: Option<Uuid>,
        requested_role: &str,
    ) -> ClinicResult<PromotionResult> {
        let target_id = target_id
            .ok_or_else(|| ClinicError::invalid("Target user ID and new role are required"))?;
        if requested_role.trim().is_empty() {
            return Err(ClinicError::invalid("Target user ID and new role are required"));
        }
        if actor_id == target_id {
            return Err(ClinicError::invalid("Cannot change your own role"));
        }
        let new_role: Role = requested_role
            .parse()
            .map_err(|_| ClinicError::invalid("Invalid role value"))?;

        let _guard = self.lock_roles().await;

        let actor_role = self.profiles.get_profile(actor_id).await?.map(|p| p.role);
        if actor_role != Some(Role::Superadmin) {
            tracing::warn!("Role change by {} refused: no longer a superadmin", actor_id);
            return Err(ClinicError::forbidden("Access denied. Only superadmins can update user roles."));
        }

        let target = self
            .profiles
            .get_profile(target_id)
            .await?
            .ok_or_else(|| ClinicError::not_found(format!("No user profile found with ID {}", target_id)))?;
        let previous_role = target.role;

        if new_role == Role::Superadmin && previous_role != Role::Superadmin {
            let superadmins = self.profiles.count_by_role(Role::Superadmin).await?;
            if superadmins >= SUPERADMIN_CAP {
                return self.transfer(actor_id, target_id, previous_role).await;
            }
        }

        if !self.profiles.update_role(target_id, new_role).await? {
            return Err(ClinicError::not_found(format!(
                "No user profile found with ID {}",
                target_id
            )));
        }

        self.record(
            NewAuditEntry::new(actor_id, AuditAction::UpdateRole, target_id)
                .with_roles(Some(previous_role), new_role)
                .with_details(json!({
                    "previous_role": previous_role,
                    "new_role": new_role,
                })),
        )
        .await;

        tracing::info!("✓ Role of {} updated from {} to {}", target_id, previous_role, new_role);
        Ok(PromotionResult::Promoted {
            target_id,
            previous_role,
            new_role,
        })
    }

    async fn transfer(&self, actor_id: Uuid, target_id: Uuid, previous_role: Role) -> ClinicResult<PromotionResult> {
        match self.profiles.update_role(actor_id, Role::Admin).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(ClinicError::TransferFailed {
                    reason: format!("acting superadmin {} has no profile", actor_id),
                    compensation: Compensation::NotNeeded,
                })
            }
            Err(e) => {
                return Err(ClinicError::TransferFailed {
                    reason: format!("error demoting current superadmin: {}", e),
                    compensation: Compensation::NotNeeded,
                })
            }
        }

        let reason = match self.profiles.update_role(target_id, Role::Superadmin).await {
            Ok(true) => None,
            Ok(false) => Some(format!("no user profile found with ID {}", target_id)),
            Err(e) => Some(format!("error promoting target user: {}", e)),
        };

        if let Some(reason) = reason {
            let compensation = self.revert_actor(actor_id).await;
            return Err(ClinicError::TransferFailed {
                reason,
                compensation,
            });
        }

        self.record(
            NewAuditEntry::new(actor_id, AuditAction::RoleTransfer, target_id)
                .with_roles(Some(previous_role), Role::Superadmin)
                .with_details(json!({
                    "previous_role": previous_role,
                    "new_role": Role::Superadmin,
                    "transferred_from": actor_id,
                    "transferred_to": target_id,
                })),
        )
        .await;

        tracing::info!("✓ Superadmin role transferred from {} to {}", actor_id, target_id);
        Ok(PromotionResult::Transferred {
            actor_id,
            target_id,
            previous_role,
        })
    }

    async fn revert_actor(&self, actor_id: Uuid) -> Compensation {
        match self.profiles.update_role(actor_id, Role::Superadmin).await {
            Ok(true) => {
                tracing::warn!("Reverted {} to superadmin after failed transfer", actor_id);
                Compensation::Reverted
            }
            Ok(false) => {
                tracing::error!("Could not revert {} to superadmin: profile vanished", actor_id);
                Compensation::RevertFailed(format!("profile {} no longer exists", actor_id))
            }
            Err(e) => {
                tracing::error!("Could not revert {} to superadmin: {}", actor_id, e);
                Compensation::RevertFailed(e.to_string())
            }
        }
    }

    async fn record(&self, entry: NewAuditEntry) {
        let action = entry.action.clone();
        if let Err(e) = self.audit.append(entry).await {
            tracing::warn!("Failed to write {} audit entry: {}", action, e);
        }
    }
}
