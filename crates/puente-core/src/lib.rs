//! Puente Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the Puente call bridging engine. It includes:
//!
//! - Domain models (CallSession, CallLeg, CallOutcome, CallEvent)
//! - The client-state correlation token codec
//! - Common traits for external collaborators (provider API, persistence,
//!   identity resolution, client notification)
//! - Unified error handling with HTTP response mapping
//! - Application configuration

pub mod client_state;
pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use client_state::ClientState;
pub use config::AppConfig;
pub use error::AppError;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
