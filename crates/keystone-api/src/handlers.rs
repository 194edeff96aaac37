//! API handlers.

pub mod audit;
pub mod health;
pub mod me;
pub mod permissions;
pub mod users;

pub use health::*;
