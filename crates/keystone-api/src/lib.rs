//! HTTP API for Keystone.
//!
//! This crate provides:
//! - bearer token authentication
//! - per-route permission checks through the access guard
//! - permission catalog, principal and grant administration
//! - audit trail queries, stats and retention

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod pagination;
pub mod response;
pub mod routes;
pub mod state;
pub mod token;

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use pagination::{PagedResponse, Pagination};
pub use routes::create_router;
pub use state::{AppConfig, AppState};
pub use token::{TokenClaims, TokenConfig, TokenManager};
