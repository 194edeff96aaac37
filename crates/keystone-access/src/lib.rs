//! Permission resolution and access control for Keystone.
//!
//! This crate provides:
//! - A static permission catalog with idempotent seeding
//! - Role-plus-grant resolution with an admin sentinel and a TTL cache
//! - A transport-agnostic guard returning tagged decisions
//! - Audited grant/revoke, user lifecycle and permission administration

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod grants;
pub mod guard;
pub mod permissions;
pub mod resolver;
pub mod users;

pub use cache::{CacheStats, PermissionCache};
pub use catalog::{list_definitions, role_permissions, seed, PermissionDefinition, SeedReport};
pub use config::AccessConfig;
pub use context::ActorContext;
pub use error::{AccessError, AccessResult};
pub use grants::GrantManager;
pub use guard::{decide, AccessDecision, AccessGuard, MatchMode, PermissionRequirement};
pub use permissions::PermissionService;
pub use resolver::{EffectivePermissions, PermissionResolver};
pub use users::UserService;

use keystone_audit::AuditRecorder;
use keystone_storage::{PermissionStore, UserStore};
use std::sync::Arc;

/// The access layer wired over one set of stores.
///
/// Every component shares a single resolver, so an invalidation issued by
/// any of them is visible to the guard immediately.
#[derive(Clone)]
pub struct AccessControl {
    resolver: Arc<PermissionResolver>,
    guard: AccessGuard,
    grants: GrantManager,
    users: UserService,
    permissions: PermissionService,
    permission_store: Arc<dyn PermissionStore>,
}

impl AccessControl {
    /// Wires the access layer.
    pub fn new(
        user_store: Arc<dyn UserStore>,
        permission_store: Arc<dyn PermissionStore>,
        audit: AuditRecorder,
        config: &AccessConfig,
    ) -> Self {
        let resolver = Arc::new(PermissionResolver::new(
            user_store.clone(),
            permission_store.clone(),
            config,
        ));

        Self {
            guard: AccessGuard::new(resolver.clone()),
            grants: GrantManager::new(
                user_store.clone(),
                permission_store.clone(),
                resolver.clone(),
                audit.clone(),
            ),
            users: UserService::new(user_store, resolver.clone(), audit.clone()),
            permissions: PermissionService::new(permission_store.clone(), resolver.clone(), audit),
            resolver,
            permission_store,
        }
    }

    /// Seeds the permission catalog.
    pub async fn seed_catalog(&self) -> AccessResult<SeedReport> {
        seed(self.permission_store.as_ref()).await
    }

    /// The shared resolver.
    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// The guard.
    pub fn guard(&self) -> &AccessGuard {
        &self.guard
    }

    /// The grant manager.
    pub fn grants(&self) -> &GrantManager {
        &self.grants
    }

    /// The user service.
    pub fn users(&self) -> &UserService {
        &self.users
    }

    /// The permission service.
    pub fn permissions(&self) -> &PermissionService {
        &self.permissions
    }
}
