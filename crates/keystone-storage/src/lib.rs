//! Storage seam for Keystone.
//!
//! This crate defines the async store traits the access and audit layers
//! depend on, plus the backends implementing them:
//! - in-memory (always available, used by tests and single-node dev)
//! - PostgreSQL (feature `postgres`)

pub mod backend;
pub mod error;

pub use backend::memory::InMemoryBackend;
pub use backend::{AdminGuarded, AuditStore, PermissionStore, UserStore, SYSTEM_ACTOR};
pub use error::{StorageError, StorageResult};

#[cfg(feature = "postgres")]
pub use backend::postgres::PostgresBackend;
