//! Normalized call events pushed to connected clients
//!
//! These are the only shapes the browser ever sees; raw provider callbacks
//! never leave the server.

use serde::{Deserialize, Serialize};

/// Normalized call event
///
/// Fan-out is unaddressed: every connected client receives every event and
/// acts only on the session id it is tracking locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum CallEvent {
    /// Both legs have been requested from the provider
    #[serde(rename = "connecting")]
    Connecting {
        session_id: String,
        call_log_id: i64,
        to_number: String,
    },
    /// The PSTN leg is ringing at the callee
    #[serde(rename = "ringing")]
    Ringing { session_id: String, call_log_id: i64 },
    /// The legs are bridged; the conversation is live
    #[serde(rename = "active")]
    Active { session_id: String, call_log_id: i64 },
    /// The session is over. `error` is set only for abnormal teardowns
    /// (bridge failure); provider-side outcomes like busy are not errors.
    #[serde(rename = "ended")]
    Ended {
        session_id: String,
        call_log_id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl CallEvent {
    /// Session this event belongs to
    pub fn session_id(&self) -> &str {
        match self {
            CallEvent::Connecting { session_id, .. }
            | CallEvent::Ringing { session_id, .. }
            | CallEvent::Active { session_id, .. }
            | CallEvent::Ended { session_id, .. } => session_id,
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            CallEvent::Connecting { .. } => "connecting",
            CallEvent::Ringing { .. } => "ringing",
            CallEvent::Active { .. } => "active",
            CallEvent::Ended { .. } => "ended",
        }
    }
}
