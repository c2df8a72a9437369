//! In-memory call session registry for Puente
//!
//! Holds every in-flight call session, indexed both by session id and by
//! each leg's provider call-control id. The store is process-scoped and
//! intentionally not durable: a restart loses in-flight sessions, the TTL
//! sweeper and the provider's own ring timeouts cover the fallout.
//!
//! Both maps live behind one lock so a session and its reverse-index
//! entries are always inserted and removed together. Critical sections are
//! short and never span a provider call; the webhook processor marks state
//! under the lock, releases it, talks to the provider, then reacquires to
//! record the result.

use chrono::Utc;
use puente_core::models::{CallLeg, CallSession, LegKind};
use puente_core::{AppError, AppResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Default)]
struct StoreInner {
    /// Primary map: session id -> session
    sessions: HashMap<String, CallSession>,

    /// Reverse index: provider call-control id -> (session id, leg)
    by_call_control_id: HashMap<String, (String, LegKind)>,
}

/// Registry of in-flight call sessions
///
/// Clone-cheap via `Arc`; share one instance across the API handlers, the
/// webhook processor, and the sweeper task.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<StoreInner>,
}

impl SessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new session.
    ///
    /// Reverse-index entries for any legs already attached to the session
    /// are created in the same critical section.
    pub async fn insert(&self, session: CallSession) -> AppResult<()> {
        let mut inner = self.inner.write().await;

        if inner.sessions.contains_key(&session.session_id) {
            return Err(AppError::SessionExists(session.session_id));
        }

        for kind in [LegKind::Pstn, LegKind::Sip] {
            if let Some(leg) = session.leg(kind) {
                inner
                    .by_call_control_id
                    .insert(leg.call_control_id.clone(), (session.session_id.clone(), kind));
            }
        }

        debug!(session_id = %session.session_id, "Session registered");
        inner.sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    /// Attach a leg's call-control id after the session already exists
    /// (the create-then-attach pattern used while dialing).
    ///
    /// A leg is set once; attaching a second id of the same kind fails.
    pub async fn attach_leg(
        &self,
        session_id: &str,
        kind: LegKind,
        call_control_id: &str,
    ) -> AppResult<()> {
        let mut inner = self.inner.write().await;

        let session = inner
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;

        if session.leg(kind).is_some() {
            return Err(AppError::LegAlreadyAttached {
                session_id: session_id.to_string(),
            });
        }

        session.set_leg(kind, CallLeg::new(call_control_id));
        inner
            .by_call_control_id
            .insert(call_control_id.to_string(), (session_id.to_string(), kind));

        debug!(session_id, leg = %kind, call_control_id, "Leg attached");
        Ok(())
    }

    /// Snapshot of a session by id
    pub async fn get(&self, session_id: &str) -> Option<CallSession> {
        self.inner.read().await.sessions.get(session_id).cloned()
    }

    /// Snapshot of a session by one of its legs' call-control ids
    pub async fn get_by_call_control_id(
        &self,
        call_control_id: &str,
    ) -> Option<(CallSession, LegKind)> {
        let inner = self.inner.read().await;
        let (session_id, kind) = inner.by_call_control_id.get(call_control_id)?;
        let session = inner.sessions.get(session_id)?;
        Some((session.clone(), *kind))
    }

    /// Serialized read-modify-write on one session.
    ///
    /// The closure runs under the store lock, so two webhook handlers can
    /// never interleave their updates to the same session. Returns `None`
    /// when the session is gone.
    pub async fn update<F, R>(&self, session_id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut CallSession) -> R,
    {
        let mut inner = self.inner.write().await;
        inner.sessions.get_mut(session_id).map(f)
    }

    /// Remove a session and both of its reverse-index entries atomically
    pub async fn remove(&self, session_id: &str) -> Option<CallSession> {
        let mut inner = self.inner.write().await;
        let session = inner.sessions.remove(session_id)?;

        for kind in [LegKind::Pstn, LegKind::Sip] {
            if let Some(leg) = session.leg(kind) {
                inner.by_call_control_id.remove(&leg.call_control_id);
            }
        }

        debug!(session_id, "Session removed");
        Some(session)
    }

    /// Snapshot of every in-flight session, newest first
    pub async fn list(&self) -> Vec<CallSession> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<CallSession> = inner.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    /// Number of in-flight sessions
    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove every session older than `ttl`, regardless of state.
    ///
    /// This is the backstop against leaked sessions when a terminal webhook
    /// never arrives. No provider calls are made for swept sessions: a
    /// session this old means the provider side is already gone.
    pub async fn sweep(&self, ttl: Duration) -> usize {
        let now = Utc::now();
        let ttl_secs = ttl.as_secs() as i64;

        let mut inner = self.inner.write().await;
        let expired: Vec<String> = inner
            .sessions
            .values()
            .filter(|s| s.age_secs(now) >= ttl_secs)
            .map(|s| s.session_id.clone())
            .collect();

        for session_id in &expired {
            if let Some(session) = inner.sessions.remove(session_id) {
                for kind in [LegKind::Pstn, LegKind::Sip] {
                    if let Some(leg) = session.leg(kind) {
                        inner.by_call_control_id.remove(&leg.call_control_id);
                    }
                }
                warn!(session_id = %session.session_id, age_secs = session.age_secs(now), "Evicted stale session");
            }
        }

        expired.len()
    }
}

/// Spawn the periodic eviction sweep.
///
/// Runs until the returned handle is aborted (normally: process lifetime).
pub fn spawn_sweeper(store: Arc<SessionStore>, interval: Duration, ttl: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; skip it so a fresh process
        // doesn't sweep an empty store.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let evicted = store.sweep(ttl).await;
            if evicted > 0 {
                info!(evicted, "Session sweep complete");
            }
        }
    })
}
