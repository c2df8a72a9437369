//! Full outbound call flow: dial, both legs answer, bridge, hangup.
//!
//! Drives the dialer and the webhook processor together against an
//! in-memory provider and repository, checking the whole event sequence
//! the way the provider would deliver it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use puente_core::client_state::ClientState;
use puente_core::config::EngineConfig;
use puente_core::models::{CallEvent, CallOutcome, LegKind};
use puente_core::traits::{
    ActivityFields, CallControlApi, CallLog, CallLogRepository, CallerIdentity, EventPublisher,
    IdentityResolver, NewCallLog,
};
use puente_core::AppError;
use puente_engine::{DialRequest, Dialer, WebhookProcessor};
use puente_provider::webhook::EventPayload;
use puente_provider::{events, CallerIdPool, ProviderEvent, SipAddressCache};
use puente_store::SessionStore;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct ScriptedProvider {
    commands: Mutex<Vec<String>>,
    next_leg: AtomicUsize,
}

impl ScriptedProvider {
    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl CallControlApi for ScriptedProvider {
    async fn create_pstn_leg(
        &self,
        to: &str,
        _from: &str,
        _client_state: &str,
        _ring_timeout_secs: u32,
    ) -> Result<String, AppError> {
        let id = format!("leg-{}", self.next_leg.fetch_add(1, Ordering::SeqCst));
        self.commands
            .lock()
            .unwrap()
            .push(format!("create_pstn:{to}:{id}"));
        Ok(id)
    }

    async fn create_sip_leg(
        &self,
        sip_address: &str,
        _from: &str,
        _client_state: &str,
        _ring_timeout_secs: u32,
    ) -> Result<String, AppError> {
        let id = format!("leg-{}", self.next_leg.fetch_add(1, Ordering::SeqCst));
        self.commands
            .lock()
            .unwrap()
            .push(format!("create_sip:{sip_address}:{id}"));
        Ok(id)
    }

    async fn bridge(&self, a: &str, b: &str) -> Result<(), AppError> {
        self.commands.lock().unwrap().push(format!("bridge:{a}:{b}"));
        Ok(())
    }

    async fn hangup(&self, id: &str) -> Result<(), AppError> {
        self.commands.lock().unwrap().push(format!("hangup:{id}"));
        Ok(())
    }

    async fn start_recording(&self, id: &str) -> Result<(), AppError> {
        self.commands.lock().unwrap().push(format!("record:{id}"));
        Ok(())
    }

    async fn resolve_sip_address(&self) -> Result<String, AppError> {
        Ok("sip:agent@sip.example.com".to_string())
    }
}

#[derive(Default)]
struct MemoryRepo {
    inner: Mutex<(i64, HashMap<i64, CallLog>, usize)>,
}

impl MemoryRepo {
    fn get(&self, id: i64) -> Option<CallLog> {
        self.inner.lock().unwrap().1.get(&id).cloned()
    }

    fn activities(&self) -> usize {
        self.inner.lock().unwrap().2
    }
}

#[async_trait]
impl CallLogRepository for MemoryRepo {
    async fn create(&self, log: &NewCallLog) -> Result<i64, AppError> {
        let mut inner = self.inner.lock().unwrap();
        inner.0 += 1;
        let id = inner.0;
        inner.1.insert(
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
        if let Some(record) = inner.1.get_mut(&id) {
            record.answered_at = Some(at);
        }
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
            .1
            .get_mut(&id)
            .ok_or_else(|| AppError::CallLogNotFound(id.to_string()))?;
        if record.outcome.is_some() {
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
        if let Some(record) = inner.1.get_mut(&id) {
            record.recording_url = Some(url.to_string());
        }
        Ok(())
    }

    async fn create_activity(&self, _id: i64, _activity: &ActivityFields) -> Result<(), AppError> {
        self.inner.lock().unwrap().2 += 1;
        Ok(())
    }

    async fn find_by_provider_session(&self, _: &str) -> Result<Option<CallLog>, AppError> {
        Ok(None)
    }
}

struct NoIdentity;

#[async_trait]
impl IdentityResolver for NoIdentity {
    async fn resolve(&self, _: &str) -> Result<CallerIdentity, AppError> {
        Ok(CallerIdentity::default())
    }
}

#[derive(Default)]
struct EventLog(Mutex<Vec<CallEvent>>);

impl EventLog {
    fn kinds(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().iter().map(|e| e.kind()).collect()
    }
}

impl EventPublisher for EventLog {
    fn publish(&self, event: CallEvent) {
        self.0.lock().unwrap().push(event);
    }
}

fn callback(event_type: &str, session_id: &str, leg: LegKind, call_log_id: i64, leg_id: &str) -> ProviderEvent {
    ProviderEvent {
        event_type: event_type.to_string(),
        payload: EventPayload {
            call_control_id: Some(leg_id.to_string()),
            client_state: Some(ClientState::new(session_id, leg, call_log_id).encode()),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn dial_bridge_hangup_round_trip() {
    let api = Arc::new(ScriptedProvider::default());
    let repo = Arc::new(MemoryRepo::default());
    let publisher = Arc::new(EventLog::default());
    let store = SessionStore::new();

    let dialer = Dialer::new(
        api.clone(),
        repo.clone(),
        Arc::new(NoIdentity),
        publisher.clone(),
        store.clone(),
        Arc::new(SipAddressCache::new(api.clone(), Duration::from_secs(3600))),
        Arc::new(CallerIdPool::new(vec!["+15559990000".to_string()])),
        EngineConfig::default(),
    );
    let processor = WebhookProcessor::new(
        api.clone(),
        repo.clone(),
        publisher.clone(),
        store.clone(),
        EngineConfig::default(),
    );

    let outcome = dialer
        .dial(DialRequest {
            to_number: "+15551234567".to_string(),
            from_number: None,
            user_id: Some(3),
        })
        .await
        .unwrap();

    let session = store.get(&outcome.session_id).await.unwrap();
    let pstn_id = session.pstn_leg.as_ref().unwrap().call_control_id.clone();
    let sip_id = session.sip_leg.as_ref().unwrap().call_control_id.clone();
    let (sid, clid) = (outcome.session_id.clone(), outcome.call_log_id);

    // Provider delivers the callbacks in the usual order: both legs
    // initiated, the operator's phone answers first, then the callee.
    for event in [
        callback(events::CALL_INITIATED, &sid, LegKind::Pstn, clid, &pstn_id),
        callback(events::CALL_INITIATED, &sid, LegKind::Sip, clid, &sip_id),
        callback(events::CALL_RINGING, &sid, LegKind::Sip, clid, &sip_id),
        callback(events::CALL_ANSWERED, &sid, LegKind::Sip, clid, &sip_id),
        callback(events::CALL_RINGING, &sid, LegKind::Pstn, clid, &pstn_id),
        callback(events::CALL_ANSWERED, &sid, LegKind::Pstn, clid, &pstn_id),
    ] {
        processor.process(&event).await;
    }

    // Exactly one bridge of A toward B, and the session is live
    assert_eq!(api.count("bridge:"), 1);
    assert!(api
        .commands()
        .contains(&format!("bridge:{pstn_id}:{sip_id}")));
    assert!(store.get(&sid).await.unwrap().bridged);
    assert_eq!(
        publisher.kinds(),
        vec!["connecting", "ringing", "active"]
    );

    // The callee hangs up normally after a 95 second conversation
    let mut hangup = callback(events::CALL_HANGUP, &sid, LegKind::Pstn, clid, &pstn_id);
    hangup.payload.hangup_cause = Some("normal_clearing".to_string());
    hangup.payload.occurred_at = Some(Utc::now() + chrono::Duration::seconds(95));
    processor.process(&hangup).await;

    // The operator leg is torn down, one ended event, and the session is
    // gone immediately
    assert_eq!(api.count(&format!("hangup:{sip_id}")), 1);
    assert_eq!(
        publisher.kinds(),
        vec!["connecting", "ringing", "active", "ended"]
    );
    assert!(store.get(&sid).await.is_none());

    let record = repo.get(clid).unwrap();
    assert_eq!(record.outcome.as_deref(), Some("completed"));
    assert!(record.answered_at.is_some());
    assert_eq!(repo.activities(), 1);

    // Late duplicate of the other leg's hangup is absorbed
    let mut late = callback(events::CALL_HANGUP, &sid, LegKind::Sip, clid, &sip_id);
    late.payload.hangup_cause = Some("normal_clearing".to_string());
    processor.process(&late).await;
    assert_eq!(publisher.kinds().len(), 4);
    assert_eq!(repo.activities(), 1);
}
