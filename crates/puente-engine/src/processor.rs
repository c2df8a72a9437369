//! Webhook event processing
//!
//! The state machine at the center of the engine. Consumes provider
//! callbacks, validates them against current session state, triggers the
//! bridge/hangup/recording side effects, and emits normalized events for
//! connected clients.
//!
//! Two rules shape everything here:
//!
//! - Callbacks for the two legs arrive concurrently and unordered, so all
//!   state reads and writes for a session happen inside the store's
//!   critical section, and the bridge decision is claimed there before the
//!   provider call is issued.
//! - Nothing in this module returns an error to the webhook ingress. The
//!   provider retries failed deliveries indefinitely; every failure is
//!   absorbed after logging.

use crate::finalizer::{ActivityContext, CallRecordFinalizer};
use puente_core::client_state::ClientState;
use puente_core::config::EngineConfig;
use puente_core::models::{CallEvent, CallOutcome, HangupCause, LegKind, LegStatus};
use puente_core::traits::{CallControlApi, CallLogRepository, EventPublisher};
use puente_provider::{events, ProviderEvent};
use puente_store::SessionStore;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// A webhook after the correlation split.
///
/// `Correlated` events belong to a session this engine created and carry a
/// decoded client-state token. Everything else (no token, or a token that
/// does not decode) takes the single-leg bookkeeping path.
enum RoutedEvent {
    Correlated(ClientState),
    Uncorrelated,
}

/// Consumes provider callbacks and drives session state
pub struct WebhookProcessor<C, R, P> {
    api: Arc<C>,
    repo: Arc<R>,
    publisher: Arc<P>,
    store: Arc<SessionStore>,
    finalizer: CallRecordFinalizer<R>,
    config: EngineConfig,
}

impl<C, R, P> WebhookProcessor<C, R, P>
where
    C: CallControlApi,
    R: CallLogRepository,
    P: EventPublisher,
{
    pub fn new(
        api: Arc<C>,
        repo: Arc<R>,
        publisher: Arc<P>,
        store: Arc<SessionStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            api,
            repo: repo.clone(),
            publisher,
            store,
            finalizer: CallRecordFinalizer::new(repo),
            config,
        }
    }

    /// Handle one callback. Infallible by design: the ingress acknowledges
    /// the delivery no matter what happened here.
    #[instrument(skip(self, event), fields(event_type = %event.event_type()))]
    pub async fn process(&self, event: &ProviderEvent) {
        match self.route(event) {
            RoutedEvent::Correlated(state) => self.process_correlated(state, event).await,
            RoutedEvent::Uncorrelated => self.process_uncorrelated(event).await,
        }
    }

    fn route(&self, event: &ProviderEvent) -> RoutedEvent {
        match event.client_state() {
            Some(token) => match ClientState::decode(token) {
                Some(state) => RoutedEvent::Correlated(state),
                None => {
                    warn!("Client state did not decode, treating as uncorrelated");
                    RoutedEvent::Uncorrelated
                }
            },
            None => RoutedEvent::Uncorrelated,
        }
    }

    // ==================== Correlated path ====================

    async fn process_correlated(&self, state: ClientState, event: &ProviderEvent) {
        match event.event_type() {
            events::CALL_INITIATED => self.on_initiated(&state, event).await,
            events::CALL_RINGING => self.on_ringing(&state).await,
            events::CALL_ANSWERED => self.on_answered(&state).await,
            events::CALL_HANGUP => self.on_hangup(&state, event).await,
            events::RECORDING_SAVED => self.on_recording_saved(state.call_log_id, event).await,
            other => debug!(event_type = other, "Ignoring unhandled event type"),
        }
    }

    /// The leg exists at the provider. Record its call-control id if the
    /// dial path has not attached it yet; no side effects otherwise.
    async fn on_initiated(&self, state: &ClientState, event: &ProviderEvent) {
        let Some(call_control_id) = event.call_control_id() else {
            warn!("Initiated event without call_control_id");
            return;
        };

        let known = self
            .store
            .update(&state.session_id, |s| s.leg(state.leg).is_some())
            .await;

        match known {
            None => self.log_unknown_session(state, events::CALL_INITIATED),
            Some(true) => {}
            Some(false) => {
                if let Err(e) = self
                    .store
                    .attach_leg(&state.session_id, state.leg, call_control_id)
                    .await
                {
                    // Lost a race against the dial path attaching the same leg
                    debug!(session_id = %state.session_id, error = %e, "Leg attach skipped");
                }
            }
        }
    }

    /// Only the PSTN leg's ringing is surfaced: the browser already knows
    /// its own leg is ringing from its local signaling stack.
    async fn on_ringing(&self, state: &ClientState) {
        let result = self
            .store
            .update(&state.session_id, |s| {
                let mut advanced = false;
                if let Some(leg) = s.leg_mut(state.leg) {
                    if leg.status == LegStatus::Initiated {
                        leg.status = LegStatus::Ringing;
                        advanced = true;
                    }
                }
                (advanced, s.call_log_id)
            })
            .await;

        match result {
            None => self.log_unknown_session(state, events::CALL_RINGING),
            Some((true, call_log_id)) if state.leg == LegKind::Pstn => {
                self.publisher.publish(CallEvent::Ringing {
                    session_id: state.session_id.clone(),
                    call_log_id,
                });
            }
            Some(_) => {}
        }
    }

    /// Leg answered. The bridge decision fires only from the PSTN leg's
    /// transition: the callee picking up is the real-world signal that the
    /// conversation can start, while the SIP leg answering only means the
    /// operator's client accepted the inbound signal and is waiting.
    async fn on_answered(&self, state: &ClientState) {
        let decision = self
            .store
            .update(&state.session_id, |s| {
                if let Some(leg) = s.leg_mut(state.leg) {
                    if leg.status != LegStatus::Hangup {
                        leg.status = LegStatus::Answered;
                    }
                }

                if state.leg == LegKind::Pstn && !s.bridged && s.both_answered() {
                    // Claim the one bridge attempt while still holding the
                    // lock; repeated answered deliveries find bridged=true.
                    s.bridged = true;
                    let pstn_id = s.pstn_leg.as_ref().map(|l| l.call_control_id.clone());
                    let sip_id = s.sip_leg.as_ref().map(|l| l.call_control_id.clone());
                    pstn_id.zip(sip_id).map(|(a, b)| (a, b, s.call_log_id))
                } else {
                    None
                }
            })
            .await;

        match decision {
            None => self.log_unknown_session(state, events::CALL_ANSWERED),
            Some(None) => {}
            Some(Some((pstn_id, sip_id, call_log_id))) => {
                self.execute_bridge(&state.session_id, &pstn_id, &sip_id, call_log_id)
                    .await;
            }
        }
    }

    /// Issue the claimed bridge command, outside the store lock.
    async fn execute_bridge(
        &self,
        session_id: &str,
        pstn_id: &str,
        sip_id: &str,
        call_log_id: i64,
    ) {
        match self.api.bridge(pstn_id, sip_id).await {
            Ok(()) => {
                let now = chrono::Utc::now();
                self.store
                    .update(session_id, |s| s.answered_at = Some(now))
                    .await;

                if let Err(e) = self.repo.mark_answered(call_log_id, now).await {
                    warn!(call_log_id, error = %e, "Failed to record answer time");
                }

                if self.config.record_calls {
                    if let Err(e) = self.api.start_recording(pstn_id).await {
                        warn!(session_id, error = %e, "Recording start failed");
                    }
                }

                info!(session_id, "Legs bridged, call is live");
                self.publisher.publish(CallEvent::Active {
                    session_id: session_id.to_string(),
                    call_log_id,
                });
            }
            Err(e) => {
                // Terminal for the session; no retry. Tear everything down.
                warn!(session_id, error = %e, "Bridge failed, tearing down both legs");

                for id in [pstn_id, sip_id] {
                    if let Err(hangup_err) = self.api.hangup(id).await {
                        warn!(session_id, error = %hangup_err, "Teardown hangup failed");
                    }
                }

                let session = self.store.remove(session_id).await;
                let context = session
                    .as_ref()
                    .map(|s| ActivityContext {
                        user_id: s.user_id,
                        contact_id: s.contact_id,
                        company_id: s.company_id,
                    })
                    .unwrap_or_default();

                if let Err(finalize_err) = self
                    .finalizer
                    .finalize(
                        call_log_id,
                        CallOutcome::Failed,
                        None,
                        chrono::Utc::now(),
                        &context,
                    )
                    .await
                {
                    warn!(call_log_id, error = %finalize_err, "Finalize after bridge failure failed");
                }

                self.publisher.publish(CallEvent::Ended {
                    session_id: session_id.to_string(),
                    call_log_id,
                    error: Some("bridge_failed".to_string()),
                });
            }
        }
    }

    /// Either leg hung up: hang up the other leg, derive the outcome,
    /// finalize the record, notify clients, drop the session.
    async fn on_hangup(&self, state: &ClientState, event: &ProviderEvent) {
        let cause = event
            .hangup_cause()
            .unwrap_or_else(|| HangupCause::Other("unknown".to_string()));

        let session = self
            .store
            .update(&state.session_id, |s| {
                if let Some(leg) = s.leg_mut(state.leg) {
                    leg.status = LegStatus::Hangup;
                }
                s.clone()
            })
            .await;

        let Some(session) = session else {
            // Second hangup after the first one removed the session, or a
            // session the TTL sweep already evicted. Nothing left to do.
            self.log_unknown_session(state, events::CALL_HANGUP);
            return;
        };

        if let Some(other_leg) = session.leg(state.leg.other()) {
            if other_leg.status.is_active() {
                if let Err(e) = self.api.hangup(&other_leg.call_control_id).await {
                    warn!(
                        session_id = %state.session_id,
                        error = %e,
                        "Failed to hang up remaining leg"
                    );
                }
            }
        }

        let outcome = CallOutcome::derive(&cause, session.was_answered());
        let context = ActivityContext {
            user_id: session.user_id,
            contact_id: session.contact_id,
            company_id: session.company_id,
        };

        if let Err(e) = self
            .finalizer
            .finalize(
                session.call_log_id,
                outcome,
                session.answered_at,
                event.occurred_at(),
                &context,
            )
            .await
        {
            warn!(call_log_id = session.call_log_id, error = %e, "Finalize failed");
        }

        info!(
            session_id = %state.session_id,
            cause = %cause,
            outcome = %outcome,
            "Call ended"
        );

        self.publisher.publish(CallEvent::Ended {
            session_id: state.session_id.clone(),
            call_log_id: session.call_log_id,
            error: None,
        });

        self.store.remove(&state.session_id).await;
    }

    async fn on_recording_saved(&self, call_log_id: i64, event: &ProviderEvent) {
        let Some(url) = event.recording_url() else {
            warn!(call_log_id, "Recording event without a URL");
            return;
        };
        // Best-effort; the finalizer already logged any failure
        let _ = self.finalizer.attach_recording(call_log_id, url).await;
    }

    fn log_unknown_session(&self, state: &ClientState, event_type: &str) {
        // Expected after a restart or a TTL eviction: the delivery is
        // acknowledged and dropped.
        info!(
            session_id = %state.session_id,
            event_type,
            "Webhook for unknown session, ignoring"
        );
    }

    // ==================== Uncorrelated path ====================

    /// Calls this engine did not originate carry no client-state token.
    /// They are matched by the provider's own session id against the call
    /// record and drive finalize-only bookkeeping: one leg, no bridging.
    async fn process_uncorrelated(&self, event: &ProviderEvent) {
        let Some(provider_session) = event.call_session_id() else {
            debug!(event_type = %event.event_type(), "Uncorrelated event without session id, ignoring");
            return;
        };

        let record = match self.repo.find_by_provider_session(provider_session).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!(provider_session, "No call record for uncorrelated event, ignoring");
                return;
            }
            Err(e) => {
                warn!(provider_session, error = %e, "Call record lookup failed");
                return;
            }
        };

        match event.event_type() {
            events::CALL_ANSWERED => {
                if let Err(e) = self.repo.mark_answered(record.id, event.occurred_at()).await {
                    warn!(call_log_id = record.id, error = %e, "Failed to record answer time");
                }
            }
            events::CALL_HANGUP => {
                if record.is_terminal() {
                    debug!(call_log_id = record.id, "Record already terminal, ignoring hangup");
                    return;
                }

                let cause = event
                    .hangup_cause()
                    .unwrap_or_else(|| HangupCause::Other("unknown".to_string()));
                let outcome = CallOutcome::derive(&cause, record.answered_at.is_some());
                let context = ActivityContext {
                    user_id: record.user_id,
                    contact_id: record.contact_id,
                    company_id: record.company_id,
                };

                if let Err(e) = self
                    .finalizer
                    .finalize(
                        record.id,
                        outcome,
                        record.answered_at,
                        event.occurred_at(),
                        &context,
                    )
                    .await
                {
                    warn!(call_log_id = record.id, error = %e, "Finalize failed");
                }
            }
            events::RECORDING_SAVED => {
                if let Some(url) = event.recording_url() {
                    let _ = self.finalizer.attach_recording(record.id, url).await;
                }
            }
            other => debug!(event_type = other, "Ignoring uncorrelated event type"),
        }
    }
}
