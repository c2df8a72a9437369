//! Test doubles for the collaborator traits
//!
//! Shared by the unit tests in this crate. The call-control fake records
//! every provider command it receives so tests can assert on exact
//! side-effect sequences; the repository fake is a faithful in-memory
//! implementation including the finalize-once contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use puente_core::models::{CallEvent, CallOutcome};
use puente_core::traits::{
    ActivityFields, CallControlApi, CallLog, CallLogRepository, CallerIdentity, EventPublisher,
    IdentityResolver, NewCallLog,
};
use puente_core::AppError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ==================== Call control ====================

#[derive(Default)]
pub struct FakeCallControl {
    commands: Mutex<Vec<String>>,
    next_leg: AtomicUsize,
    pub fail_pstn_leg: AtomicBool,
    pub fail_sip_leg: AtomicBool,
    pub fail_bridge: AtomicBool,
    pub fail_recording: AtomicBool,
}

impl FakeCallControl {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, command: String) {
        self.commands.lock().unwrap().push(command);
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn count_with_prefix(&self, prefix: &str) -> usize {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl CallControlApi for FakeCallControl {
    async fn create_pstn_leg(
        &self,
        to: &str,
        _from: &str,
        _client_state: &str,
        _ring_timeout_secs: u32,
    ) -> Result<String, AppError> {
        if self.fail_pstn_leg.load(Ordering::SeqCst) {
            return Err(AppError::LegCreation("pstn leg rejected".to_string()));
        }
        let id = format!("pstn-{}", self.next_leg.fetch_add(1, Ordering::SeqCst));
        self.record(format!("create_pstn:{to}:{id}"));
        Ok(id)
    }

    async fn create_sip_leg(
        &self,
        sip_address: &str,
        _from: &str,
        _client_state: &str,
        _ring_timeout_secs: u32,
    ) -> Result<String, AppError> {
        if self.fail_sip_leg.load(Ordering::SeqCst) {
            return Err(AppError::LegCreation("sip leg rejected".to_string()));
        }
        let id = format!("sip-{}", self.next_leg.fetch_add(1, Ordering::SeqCst));
        self.record(format!("create_sip:{sip_address}:{id}"));
        Ok(id)
    }

    async fn bridge(
        &self,
        call_control_id: &str,
        other_call_control_id: &str,
    ) -> Result<(), AppError> {
        self.record(format!("bridge:{call_control_id}:{other_call_control_id}"));
        if self.fail_bridge.load(Ordering::SeqCst) {
            return Err(AppError::Bridge("leg no longer active".to_string()));
        }
        Ok(())
    }

    async fn hangup(&self, call_control_id: &str) -> Result<(), AppError> {
        self.record(format!("hangup:{call_control_id}"));
        Ok(())
    }

    async fn start_recording(&self, call_control_id: &str) -> Result<(), AppError> {
        self.record(format!("record:{call_control_id}"));
        if self.fail_recording.load(Ordering::SeqCst) {
            return Err(AppError::Provider("recording unavailable".to_string()));
        }
        Ok(())
    }

    async fn resolve_sip_address(&self) -> Result<String, AppError> {
        Ok("sip:agent@sip.example.com".to_string())
    }
}

// ==================== Persistence ====================

#[derive(Default)]
struct CallLogsInner {
    next_id: i64,
    records: HashMap<i64, CallLog>,
    activities: HashMap<i64, usize>,
}

#[derive(Default)]
pub struct InMemoryCallLogs {
    inner: Mutex<CallLogsInner>,
}

impl InMemoryCallLogs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert an in-flight record directly and return its id
    pub async fn seed_in_flight(&self, to_number: &str) -> i64 {
        self.create(&NewCallLog {
            to_number: to_number.to_string(),
            from_number: "+15559990000".to_string(),
            direction: "outbound".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
    }

    pub async fn get(&self, id: i64) -> Option<CallLog> {
        self.inner.lock().unwrap().records.get(&id).cloned()
    }

    pub async fn activity_count(&self, id: i64) -> usize {
        *self
            .inner
            .lock()
            .unwrap()
            .activities
            .get(&id)
            .unwrap_or(&0)
    }
}

#[async_trait]
impl CallLogRepository for InMemoryCallLogs {
    async fn create(&self, log: &NewCallLog) -> Result<i64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.records.insert(
            id,
            CallLog {
                id,
                to_number: log.to_number.clone(),
                from_number: log.from_number.clone(),
                contact_id: log.contact_id,
                company_id: log.company_id,
                user_id: log.user_id,
                outcome: None,
                answered_at: None,
                ended_at: None,
                duration_secs: 0,
                recording_url: None,
            },
        );
        Ok(id)
    }

    async fn mark_answered(&self, id: i64, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .records
            .get_mut(&id)
            .ok_or_else(|| AppError::CallLogNotFound(id.to_string()))?;
        record.answered_at = Some(at);
        Ok(())
    }

    async fn finalize(
        &self,
        id: i64,
        outcome: CallOutcome,
        answered_at: Option<DateTime<Utc>>,
        ended_at: DateTime<Utc>,
        duration_secs: i64,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .records
            .get_mut(&id)
            .ok_or_else(|| AppError::CallLogNotFound(id.to_string()))?;

        if record.is_terminal() {
            return Ok(false);
        }

        record.outcome = Some(outcome.as_str().to_string());
        record.answered_at = answered_at.or(record.answered_at);
        record.ended_at = Some(ended_at);
        record.duration_secs = duration_secs;
        Ok(true)
    }

    async fn attach_recording(&self, id: i64, url: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .records
            .get_mut(&id)
            .ok_or_else(|| AppError::CallLogNotFound(id.to_string()))?;
        record.recording_url = Some(url.to_string());
        Ok(())
    }

    async fn create_activity(
        &self,
        call_log_id: i64,
        _activity: &ActivityFields,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        *inner.activities.entry(call_log_id).or_insert(0) += 1;
        Ok(())
    }

    async fn find_by_provider_session(
        &self,
        provider_session_id: &str,
    ) -> Result<Option<CallLog>, AppError> {
        // Seeded through a side table in tests that need it; keyed by the
        // record's own id rendered as "ps-{id}"
        let inner = self.inner.lock().unwrap();
        let found = provider_session_id
            .strip_prefix("ps-")
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(|id| inner.records.get(&id).cloned());
        Ok(found)
    }
}

// ==================== Identity ====================

pub struct FixedIdentity(pub CallerIdentity);

#[async_trait]
impl IdentityResolver for FixedIdentity {
    async fn resolve(&self, _phone_number: &str) -> Result<CallerIdentity, AppError> {
        Ok(self.0.clone())
    }
}

// ==================== Notification ====================

#[derive(Default)]
pub struct CollectingPublisher {
    events: Mutex<Vec<CallEvent>>,
}

impl CollectingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<CallEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == kind)
            .count()
    }
}

impl EventPublisher for CollectingPublisher {
    fn publish(&self, event: CallEvent) {
        self.events.lock().unwrap().push(event);
    }
}
