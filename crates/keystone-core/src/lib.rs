//! # Keystone Core
//!
//! Core domain types shared by every Keystone crate:
//! - Type-safe identifiers (newtype pattern)
//! - Principals and roles
//! - Permissions
//! - Audit log entries, filters and pagination

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod error;
pub mod id;
pub mod permission;
pub mod user;

pub use audit::*;
pub use error::{CoreError, CoreResult};
pub use id::*;
pub use permission::*;
pub use user::*;
