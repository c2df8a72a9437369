//! Unified error handling for Puente
//!
//! This module provides a comprehensive error type that covers all possible
//! failure scenarios in the application, with automatic HTTP response mapping.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Main application error type
///
/// All errors in the application should be converted to this type.
/// It implements `ResponseError` for automatic HTTP response generation.
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Provider Errors ====================
    #[error("Provider request failed: {0}")]
    Provider(String),

    #[error("Leg creation failed: {0}")]
    LegCreation(String),

    #[error("Bridge failed: {0}")]
    Bridge(String),

    #[error("Credential resolution failed: {0}")]
    Credentials(String),

    // ==================== Session Errors ====================
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session already exists: {0}")]
    SessionExists(String),

    #[error("Leg already attached to session {session_id}")]
    LegAlreadyAttached { session_id: String },

    // ==================== Persistence Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Call record not found: {0}")]
    CallLogNotFound(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_) | AppError::InvalidInput(_) | AppError::MissingField(_) => {
                StatusCode::BAD_REQUEST
            }

            // 404 Not Found
            AppError::SessionNotFound(_) | AppError::CallLogNotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::SessionExists(_) | AppError::LegAlreadyAttached { .. } => {
                StatusCode::CONFLICT
            }

            // 502 Bad Gateway - the provider rejected or failed the request
            AppError::Provider(_)
            | AppError::LegCreation(_)
            | AppError::Bridge(_)
            | AppError::Credentials(_) => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Provider(_) => "provider_error",
            AppError::LegCreation(_) => "leg_creation_failed",
            AppError::Bridge(_) => "bridge_failed",
            AppError::Credentials(_) => "credential_error",
            AppError::SessionNotFound(_) => "session_not_found",
            AppError::SessionExists(_) => "session_exists",
            AppError::LegAlreadyAttached { .. } => "leg_already_attached",
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::CallLogNotFound(_) => "call_log_not_found",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::MissingField(_) => "missing_field",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
