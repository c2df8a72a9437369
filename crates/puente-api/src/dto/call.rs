//! Call DTOs
//!
//! Request and response types for the dial and session endpoints.

use chrono::{DateTime, Utc};
use puente_core::models::{CallSession, LegKind, LegStatus};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Dial request from the browser
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DialCallRequest {
    /// Number to call, E.164
    #[validate(length(min = 4, message = "Destination number is required"))]
    pub to_number: String,

    /// Explicit caller number; when absent one is drawn from the
    /// configured rotation
    pub from_number: Option<String>,

    /// Operator placing the call
    pub user_id: Option<i64>,
}

/// Response once both legs have been requested from the provider
#[derive(Debug, Clone, Serialize)]
pub struct DialCallResponse {
    pub session_id: String,
    pub call_log_id: i64,
}

/// One in-flight session, as shown on the monitoring endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ActiveSessionResponse {
    pub session_id: String,
    pub call_log_id: i64,
    pub to_number: String,
    pub from_number: String,
    pub status: String,
    pub bridged: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&CallSession> for ActiveSessionResponse {
    fn from(session: &CallSession) -> Self {
        let status = if session.bridged {
            "active"
        } else if session.leg_status(LegKind::Pstn) == Some(LegStatus::Ringing) {
            "ringing"
        } else {
            "connecting"
        };

        Self {
            session_id: session.session_id.clone(),
            call_log_id: session.call_log_id,
            to_number: session.to_number.clone(),
            from_number: session.from_number.clone(),
            status: status.to_string(),
            bridged: session.bridged,
            created_at: session.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use puente_core::models::CallLeg;

    #[test]
    fn test_dial_request_validation() {
        let valid = DialCallRequest {
            to_number: "+15551234567".to_string(),
            from_number: None,
            user_id: Some(1),
        };
        assert!(valid.validate().is_ok());

        let invalid = DialCallRequest {
            to_number: "".to_string(),
            ..valid
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_session_status_derivation() {
        let mut session = CallSession::new(1, "+15551234567", "+15559990000");
        session.set_leg(LegKind::Pstn, CallLeg::new("cc-a"));

        let response = ActiveSessionResponse::from(&session);
        assert_eq!(response.status, "connecting");

        session.leg_mut(LegKind::Pstn).unwrap().status = LegStatus::Ringing;
        let response = ActiveSessionResponse::from(&session);
        assert_eq!(response.status, "ringing");

        session.bridged = true;
        let response = ActiveSessionResponse::from(&session);
        assert_eq!(response.status, "active");
    }
}
