//! Database migrations for Keystone.
//!
//! Schema files live in `migrations/` and are embedded at compile time.
//!
//! ```rust,no_run
//! use keystone_migrations::Migrator;
//! use sqlx::PgPool;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = PgPool::connect("postgres://localhost/keystone").await?;
//!     Migrator::new(pool).run().await?;
//!     Ok(())
//! }
//! ```
//!
//! The `keystone-migrate` binary exposes `run`, `status`, `revert`,
//! `validate` and `check` subcommands.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod migrator;

pub use error::{MigrationError, Result};
pub use migrator::{MigrationInfo, MigrationStatus, Migrator};

pub use sqlx::PgPool;

/// Returns the embedded migration set.
#[must_use]
pub fn migrations() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}
