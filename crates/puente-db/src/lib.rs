//! Puente Database Layer
//!
//! PostgreSQL-backed implementation of the persistence collaborator. The
//! engine itself is in-memory; this crate owns the durable side of a call:
//! the call log row created at dial time, its terminal outcome, and the
//! activity record linked to answered calls.

pub mod pool;
pub mod repositories;

pub use pool::create_pool;
pub use repositories::*;

// Re-export commonly used types
pub use puente_core::{AppError, AppResult};
pub use sqlx::PgPool;
