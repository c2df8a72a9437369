//! Repository implementations

pub mod call_log_repo;
pub mod identity_repo;

pub use call_log_repo::PgCallLogRepository;
pub use identity_repo::PgIdentityResolver;
