//! Common traits for external collaborators
//!
//! Defines the seams between the bridging engine and everything it does not
//! own: the call-control provider, the durable call-record store, CRM
//! identity resolution, and the client notification channel. Implementations
//! live in their own crates; the engine is generic over these traits.

use crate::error::AppError;
use crate::models::{CallEvent, CallOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// The provider operations the engine needs, one method per call-control
/// REST endpoint. All are network calls and may fail.
#[async_trait]
pub trait CallControlApi: Send + Sync {
    /// Place the PSTN leg toward the dialed number.
    /// Returns the provider's call-control id for the new leg.
    async fn create_pstn_leg(
        &self,
        to: &str,
        from: &str,
        client_state: &str,
        ring_timeout_secs: u32,
    ) -> Result<String, AppError>;

    /// Place the SIP leg toward the operator's soft phone.
    async fn create_sip_leg(
        &self,
        sip_address: &str,
        from: &str,
        client_state: &str,
        ring_timeout_secs: u32,
    ) -> Result<String, AppError>;

    /// Bridge two live legs into one audio path.
    /// Fails if either leg is no longer active.
    async fn bridge(&self, call_control_id: &str, other_call_control_id: &str)
        -> Result<(), AppError>;

    /// Hang up a leg. "Already hung up" is not an error.
    async fn hangup(&self, call_control_id: &str) -> Result<(), AppError>;

    /// Start recording on a bridged leg. Callers treat failures as
    /// non-fatal.
    async fn start_recording(&self, call_control_id: &str) -> Result<(), AppError>;

    /// Resolve the SIP address the operator's soft phone is reachable at.
    async fn resolve_sip_address(&self) -> Result<String, AppError>;
}

/// Fields captured when a call record is first created, before any leg
/// has produced a callback.
#[derive(Debug, Clone, Default)]
pub struct NewCallLog {
    pub to_number: String,
    pub from_number: String,
    pub direction: String,
    pub contact_id: Option<i64>,
    pub company_id: Option<i64>,
    pub user_id: Option<i64>,
    /// Provider-assigned session id, set for calls this engine did not
    /// originate (the single-leg bookkeeping path).
    pub provider_session_id: Option<String>,
}

/// Durable call record as the engine sees it
#[derive(Debug, Clone)]
pub struct CallLog {
    pub id: i64,
    pub to_number: String,
    pub from_number: String,
    pub contact_id: Option<i64>,
    pub company_id: Option<i64>,
    pub user_id: Option<i64>,
    /// Terminal outcome; `None` while the call is still in flight
    pub outcome: Option<String>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: i64,
    pub recording_url: Option<String>,
}

impl CallLog {
    /// A record with an outcome has been finalized already
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Fields for the activity record linked to an answered call
#[derive(Debug, Clone)]
pub struct ActivityFields {
    pub user_id: Option<i64>,
    pub contact_id: Option<i64>,
    pub company_id: Option<i64>,
    pub duration_secs: i64,
    pub outcome: CallOutcome,
}

/// Persistence collaborator owning call history
#[async_trait]
pub trait CallLogRepository: Send + Sync {
    /// Create the durable record at dial time; returns its id
    async fn create(&self, log: &NewCallLog) -> Result<i64, AppError>;

    /// Record the moment the call went live
    async fn mark_answered(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Write the terminal outcome and duration.
    ///
    /// Returns `false` when the record was already terminal, in which case
    /// nothing was written; this is what makes duplicate hangup deliveries
    /// harmless.
    async fn finalize(
        &self,
        id: i64,
        outcome: CallOutcome,
        answered_at: Option<DateTime<Utc>>,
        ended_at: DateTime<Utc>,
        duration_secs: i64,
    ) -> Result<bool, AppError>;

    /// Attach a saved recording reference
    async fn attach_recording(&self, id: i64, url: &str) -> Result<(), AppError>;

    /// Create the linked activity for an answered call
    async fn create_activity(
        &self,
        call_log_id: i64,
        activity: &ActivityFields,
    ) -> Result<(), AppError>;

    /// Look up a record by the provider's own session id. Used for calls
    /// this engine did not originate.
    async fn find_by_provider_session(
        &self,
        provider_session_id: &str,
    ) -> Result<Option<CallLog>, AppError>;
}

/// Contact/company match for a phone number
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub contact_id: Option<i64>,
    pub company_id: Option<i64>,
}

/// CRM lookup collaborator, consulted at dial time only
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, phone_number: &str) -> Result<CallerIdentity, AppError>;
}

/// Notification fan-out to connected browser clients.
///
/// Delivery is unaddressed; only the browser tracking a given session id
/// acts on its events. Publishing into the void (no clients connected) is
/// not an error.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: CallEvent);
}
