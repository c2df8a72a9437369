//! Client-state correlation token
//!
//! Every leg-creation request carries an opaque token that the provider
//! echoes back verbatim on every callback for that leg. The token is fully
//! self-describing (session id, leg, call-log id), so the very first
//! callback for a leg can be routed without any lookup.
//!
//! The wire form is base64 over a compact JSON object. Decoding never
//! panics: anything that is not a well-formed token comes back as `None`
//! and the caller treats the callback as unroutable.
//!
//! # Example
//!
//! ```
//! use puente_core::client_state::ClientState;
//! use puente_core::models::LegKind;
//!
//! let state = ClientState::new("sess-1", LegKind::Pstn, 42);
//! let token = state.encode();
//! assert_eq!(ClientState::decode(&token), Some(state));
//! ```

use crate::models::LegKind;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

/// Decoded contents of a client-state token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    /// Session id the leg belongs to
    #[serde(rename = "sid")]
    pub session_id: String,

    /// Which leg of the session this token was attached to
    pub leg: LegKind,

    /// Durable call record id
    #[serde(rename = "clid")]
    pub call_log_id: i64,
}

impl ClientState {
    pub fn new(session_id: impl Into<String>, leg: LegKind, call_log_id: i64) -> Self {
        Self {
            session_id: session_id.into(),
            leg,
            call_log_id,
        }
    }

    /// Encode into the transport-opaque token string
    pub fn encode(&self) -> String {
        // Serialization of this struct cannot fail: no maps, no non-string keys
        let json = serde_json::to_vec(self).expect("client state serializes");
        BASE64.encode(json)
    }

    /// Decode a token. Returns `None` for anything malformed: bad base64,
    /// bad JSON, missing fields, or an unknown leg code.
    pub fn decode(token: &str) -> Option<Self> {
        let bytes = BASE64.decode(token.trim()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}
