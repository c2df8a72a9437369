//! Call session model
//!
//! Represents an in-flight two-leg outbound call: one PSTN leg to the callee
//! and one SIP leg to the operator's soft phone. Sessions live only in memory
//! and are lost on restart by design; the durable record is the call log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which of the two legs a call-control id belongs to.
///
/// The wire code ("A"/"B") is what travels inside the client-state token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LegKind {
    /// Leg A: the external PSTN call to the dialed number
    #[serde(rename = "A")]
    Pstn,
    /// Leg B: the SIP call delivered to the operator's soft phone
    #[serde(rename = "B")]
    Sip,
}

impl LegKind {
    /// The opposite leg of the same session
    pub fn other(self) -> Self {
        match self {
            LegKind::Pstn => LegKind::Sip,
            LegKind::Sip => LegKind::Pstn,
        }
    }

    /// Single-letter wire code used in the client-state token
    pub fn code(self) -> &'static str {
        match self {
            LegKind::Pstn => "A",
            LegKind::Sip => "B",
        }
    }
}

impl fmt::Display for LegKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Per-leg lifecycle status as reported by provider callbacks.
///
/// Hangup is reachable from any state; the others advance monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    Initiated,
    Ringing,
    Answered,
    Hangup,
}

impl LegStatus {
    /// A leg that has not yet reported hangup still holds a live
    /// call-control resource at the provider.
    #[inline]
    pub fn is_active(self) -> bool {
        self != LegStatus::Hangup
    }
}

/// One call-control leg of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLeg {
    /// Provider-assigned call-control identifier
    pub call_control_id: String,

    /// Current lifecycle status
    pub status: LegStatus,
}

impl CallLeg {
    pub fn new(call_control_id: impl Into<String>) -> Self {
        Self {
            call_control_id: call_control_id.into(),
            status: LegStatus::Initiated,
        }
    }
}

/// In-flight call session correlating the two legs
///
/// Mutated only by the webhook processor; the store serializes access so a
/// single session is never updated by two handlers concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    /// Opaque unique identifier, created at dial time
    pub session_id: String,

    /// Durable call record owned by the persistence collaborator
    pub call_log_id: i64,

    /// Leg A: the PSTN call to the dialed number
    pub pstn_leg: Option<CallLeg>,

    /// Leg B: the SIP call to the operator's phone
    pub sip_leg: Option<CallLeg>,

    /// True once a bridge command has been issued for this session.
    /// Bridging is attempted at most once.
    pub bridged: bool,

    /// Dialed number (E.164)
    pub to_number: String,

    /// Caller-ID presented on the PSTN leg
    pub from_number: String,

    /// CRM contact matched for the dialed number, if any
    pub contact_id: Option<i64>,

    /// CRM company matched for the dialed number, if any
    pub company_id: Option<i64>,

    /// Operator who placed the call
    pub user_id: Option<i64>,

    /// When the bridge went live (both legs answered)
    pub answered_at: Option<DateTime<Utc>>,

    /// Creation timestamp, basis for TTL eviction
    pub created_at: DateTime<Utc>,
}

impl CallSession {
    /// Create a new session with no legs attached yet
    pub fn new(call_log_id: i64, to_number: impl Into<String>, from_number: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            call_log_id,
            pstn_leg: None,
            sip_leg: None,
            bridged: false,
            to_number: to_number.into(),
            from_number: from_number.into(),
            contact_id: None,
            company_id: None,
            user_id: None,
            answered_at: None,
            created_at: Utc::now(),
        }
    }

    /// Borrow the leg of the given kind
    pub fn leg(&self, kind: LegKind) -> Option<&CallLeg> {
        match kind {
            LegKind::Pstn => self.pstn_leg.as_ref(),
            LegKind::Sip => self.sip_leg.as_ref(),
        }
    }

    /// Mutably borrow the leg of the given kind
    pub fn leg_mut(&mut self, kind: LegKind) -> Option<&mut CallLeg> {
        match kind {
            LegKind::Pstn => self.pstn_leg.as_mut(),
            LegKind::Sip => self.sip_leg.as_mut(),
        }
    }

    /// Attach a leg's call-control id. Legs are set once; attaching a second
    /// id of the same kind is rejected by the store.
    pub fn set_leg(&mut self, kind: LegKind, leg: CallLeg) {
        match kind {
            LegKind::Pstn => self.pstn_leg = Some(leg),
            LegKind::Sip => self.sip_leg = Some(leg),
        }
    }

    /// Current status of the given leg, if attached
    pub fn leg_status(&self, kind: LegKind) -> Option<LegStatus> {
        self.leg(kind).map(|l| l.status)
    }

    /// Both legs have reported answered
    pub fn both_answered(&self) -> bool {
        self.leg_status(LegKind::Pstn) == Some(LegStatus::Answered)
            && self.leg_status(LegKind::Sip) == Some(LegStatus::Answered)
    }

    /// Both legs have reached hangup; the session can be removed
    pub fn fully_hung_up(&self) -> bool {
        self.leg_status(LegKind::Pstn) == Some(LegStatus::Hangup)
            && self.leg_status(LegKind::Sip) == Some(LegStatus::Hangup)
    }

    /// The call was live at some point
    #[inline]
    pub fn was_answered(&self) -> bool {
        self.answered_at.is_some()
    }

    /// Age of the session, used by the TTL sweeper
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds()
    }
}
