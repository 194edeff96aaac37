//! Audit trail for Keystone.
//!
//! Every mutating operation in the access layer describes itself with an
//! [`AuditLogEntry`](keystone_core::AuditLogEntry) and hands it to the
//! [`AuditRecorder`]. The recorder:
//! - redacts sensitive fields from before/after snapshots
//! - persists best-effort, logging instead of failing the caller
//! - serves filtered queries, aggregate stats and retention sweeps

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod recorder;
pub mod redact;
pub mod stats;

pub use config::AuditConfig;
pub use error::{AuditError, AuditResult};
pub use recorder::AuditRecorder;
pub use redact::{redact, REDACTION_MARKER, SENSITIVE_FIELDS};
pub use stats::{AuditStats, CountEntry};
