//! Principal lifecycle with last-admin protection.

use crate::context::{audit_failure, ActorContext};
use crate::resolver::PermissionResolver;
use crate::{AccessError, AccessResult};
use keystone_audit::AuditRecorder;
use keystone_core::{NewUser, Page, PageRequest, Role, User, UserId};
use keystone_storage::{AdminGuarded, UserStore};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

const RESOURCE: &str = "users";

/// Creates, reads, re-roles and deletes principals.
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
    resolver: Arc<PermissionResolver>,
    audit: AuditRecorder,
}

impl UserService {
    /// Creates a user service.
    pub fn new(
        users: Arc<dyn UserStore>,
        resolver: Arc<PermissionResolver>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            users,
            resolver,
            audit,
        }
    }

    /// Creates a principal. Fails with `Conflict` on a taken email.
    pub async fn create_user(
        &self,
        actor: &ActorContext,
        new_user: NewUser,
    ) -> AccessResult<User> {
        let entry = actor.audit("create_user", RESOURCE);

        let email = new_user.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            let err =
                AccessError::Validation(format!("invalid email address: {:?}", new_user.email));
            return Err(audit_failure(&self.audit, entry, err).await);
        }

        let user = NewUser { email, ..new_user }.into_user();
        let taken = format!("email '{}' is already registered", user.email);

        let created = match self.users.find_user_by_email(&user.email).await {
            Ok(Some(_)) => Err(AccessError::Conflict(taken)),
            Ok(None) => self
                .users
                .create_user(&user)
                .await
                .map_err(|e| AccessError::on_duplicate(e, taken)),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = created {
            return Err(audit_failure(&self.audit, entry, e).await);
        }

        info!(user_id = %user.id, role = %user.role, "User created");
        self.audit
            .record(
                entry
                    .resource_id(user.id)
                    .new_values(snapshot(&user))
                    .build(),
            )
            .await;
        Ok(user)
    }

    /// Loads a principal.
    pub async fn get_user(&self, user_id: UserId) -> AccessResult<User> {
        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AccessError::user_not_found(user_id))
    }

    /// Lists principals.
    pub async fn list_users(&self, page: PageRequest) -> AccessResult<Page<User>> {
        Ok(self.users.list_users(page).await?)
    }

    /// Changes a principal's role. Demoting the last admin fails with `LastAdmin`.
    pub async fn update_role(
        &self,
        actor: &ActorContext,
        user_id: UserId,
        role: Role,
    ) -> AccessResult<User> {
        let entry = actor.audit("update_user_role", RESOURCE).resource_id(user_id);

        let result = self.change_role(user_id, role).await;
        match result {
            Ok((before, after)) => {
                self.resolver.invalidate(user_id);
                if before.role != after.role {
                    info!(%user_id, from = %before.role, to = %after.role, "User role changed");
                    self.audit
                        .record(
                            entry
                                .old_values(json!({ "role": before.role }))
                                .new_values(json!({ "role": after.role }))
                                .build(),
                        )
                        .await;
                }
                Ok(after)
            }
            Err(e) => Err(audit_failure(&self.audit, entry, e).await),
        }
    }

    async fn change_role(&self, user_id: UserId, role: Role) -> AccessResult<(User, User)> {
        let outcome = self.users.update_user_role(user_id, role).await?;
        guarded(outcome, user_id, "cannot demote the last admin")
    }

    /// Deletes a principal and its grants. Deleting the last admin fails with `LastAdmin`.
    pub async fn delete_user(&self, actor: &ActorContext, user_id: UserId) -> AccessResult<()> {
        let entry = actor.audit("delete_user", RESOURCE).resource_id(user_id);

        match self.remove(user_id).await {
            Ok(user) => {
                self.resolver.invalidate(user_id);
                info!(%user_id, "User deleted");
                self.audit.record(entry.old_values(snapshot(&user)).build()).await;
                Ok(())
            }
            Err(e) => Err(audit_failure(&self.audit, entry, e).await),
        }
    }

    async fn remove(&self, user_id: UserId) -> AccessResult<User> {
        let outcome = self.users.delete_user(user_id).await?;
        guarded(outcome, user_id, "cannot delete the last admin")
    }

    /// Creates or promotes an admin when none exists.
    ///
    /// Returns the admin if one was created or promoted.
    pub async fn ensure_bootstrap_admin(&self, email: &str) -> AccessResult<Option<User>> {
        if self.users.count_users_with_role(Role::Admin).await? > 0 {
            return Ok(None);
        }

        let system = ActorContext::system();
        let email = email.trim().to_lowercase();
        let admin = match self.users.find_user_by_email(&email).await? {
            Some(existing) => self.update_role(&system, existing.id, Role::Admin).await?,
            None => {
                self.create_user(&system, NewUser::new(email).with_role(Role::Admin))
                    .await?
            }
        };

        warn!(
            user_id = %admin.id,
            email = %admin.email,
            "No admin existed; bootstrap admin provisioned"
        );
        Ok(Some(admin))
    }
}

fn guarded<T>(outcome: AdminGuarded<T>, user_id: UserId, message: &str) -> AccessResult<T> {
    match outcome {
        AdminGuarded::Applied(value) => Ok(value),
        AdminGuarded::NotFound => Err(AccessError::user_not_found(user_id)),
        AdminGuarded::LastAdmin => Err(AccessError::LastAdmin(message.to_string())),
    }
}

fn snapshot(user: &User) -> serde_json::Value {
    json!({
        "id": user.id,
        "email": user.email,
        "name": user.name,
        "role": user.role,
    })
}
