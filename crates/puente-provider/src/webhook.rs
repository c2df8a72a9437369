//! Provider webhook callback parsing
//!
//! Callbacks arrive as a JSON envelope `{event_type, payload}`. The payload
//! is deliberately loose: the provider sends far more fields than the
//! engine reads, so this module models only what the state machine needs
//! and exposes it through accessors.

use chrono::{DateTime, Utc};
use puente_core::models::HangupCause;
use serde::Deserialize;

/// Parsed webhook callback
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEvent {
    pub event_type: String,

    #[serde(default)]
    pub payload: EventPayload,
}

/// Leg-level detail carried on a callback
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPayload {
    /// Provider id of the leg this callback is about
    pub call_control_id: Option<String>,

    /// Provider's own grouping id; the correlation key for calls this
    /// engine did not originate
    pub call_session_id: Option<String>,

    /// Echo of the client-state token set at leg creation, absent on
    /// calls the engine did not originate
    pub client_state: Option<String>,

    /// Set on hangup callbacks
    pub hangup_cause: Option<String>,

    /// Set on recording callbacks
    pub recording_url: Option<String>,

    /// Provider-side timestamp of the event
    pub occurred_at: Option<DateTime<Utc>>,
}

impl ProviderEvent {
    /// Parse a raw webhook body. Any JSON that fits the envelope parses;
    /// the payload fields are all optional.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn call_control_id(&self) -> Option<&str> {
        self.payload.call_control_id.as_deref()
    }

    pub fn call_session_id(&self) -> Option<&str> {
        self.payload.call_session_id.as_deref()
    }

    pub fn client_state(&self) -> Option<&str> {
        self.payload.client_state.as_deref()
    }

    /// Hangup cause, parsed. `None` when the callback carries no cause.
    pub fn hangup_cause(&self) -> Option<HangupCause> {
        self.payload.hangup_cause.as_deref().map(HangupCause::parse)
    }

    pub fn recording_url(&self) -> Option<&str> {
        self.payload.recording_url.as_deref()
    }

    /// Event timestamp, falling back to receipt time
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.payload.occurred_at.unwrap_or_else(Utc::now)
    }
}
