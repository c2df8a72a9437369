//! Dial orchestration
//!
//! Places the two legs of an outbound call and registers the session. The
//! dial call returns once both legs have been *requested* from the
//! provider, not once they are answered; everything after that is driven
//! by webhook callbacks.
//!
//! Setup failures abort before further side effects: a PSTN leg that was
//! already created when the SIP leg fails is hung up, and the session is
//! removed, before the error propagates to the caller.

use puente_core::client_state::ClientState;
use puente_core::config::EngineConfig;
use puente_core::models::{CallEvent, CallSession, LegKind, LegStatus};
use puente_core::traits::{
    CallControlApi, CallLogRepository, EventPublisher, IdentityResolver, NewCallLog,
};
use puente_core::{AppError, AppResult};
use puente_provider::{CallerIdPool, SipAddressCache};
use puente_store::SessionStore;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A dial request from the API layer
#[derive(Debug, Clone)]
pub struct DialRequest {
    pub to_number: String,
    /// Explicit caller number; when absent one is drawn from the pool
    pub from_number: Option<String>,
    pub user_id: Option<i64>,
}

/// What the caller gets back once both legs are requested
#[derive(Debug, Clone)]
pub struct DialOutcome {
    pub session_id: String,
    pub call_log_id: i64,
}

/// Places outbound calls and handles client-initiated teardown
pub struct Dialer<C, R, I, P> {
    api: Arc<C>,
    repo: Arc<R>,
    identity: Arc<I>,
    publisher: Arc<P>,
    store: Arc<SessionStore>,
    sip_cache: Arc<SipAddressCache<C>>,
    caller_ids: Arc<CallerIdPool>,
    config: EngineConfig,
}

impl<C, R, I, P> Dialer<C, R, I, P>
where
    C: CallControlApi,
    R: CallLogRepository,
    I: IdentityResolver,
    P: EventPublisher,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Arc<C>,
        repo: Arc<R>,
        identity: Arc<I>,
        publisher: Arc<P>,
        store: Arc<SessionStore>,
        sip_cache: Arc<SipAddressCache<C>>,
        caller_ids: Arc<CallerIdPool>,
        config: EngineConfig,
    ) -> Self {
        Self {
            api,
            repo,
            identity,
            publisher,
            store,
            sip_cache,
            caller_ids,
            config,
        }
    }

    /// Place an outbound call: create the durable record, register the
    /// session, then request both legs from the provider.
    #[instrument(skip(self, request), fields(to = %request.to_number))]
    pub async fn dial(&self, request: DialRequest) -> AppResult<DialOutcome> {
        let from_number = match request.from_number {
            Some(number) => number,
            None => self
                .caller_ids
                .next()
                .map(str::to_string)
                .ok_or_else(|| AppError::Config("no outbound caller numbers configured".to_string()))?,
        };

        // Credential resolution is a setup step; failure aborts before any
        // leg exists.
        let sip_address = self.sip_cache.get().await?;

        // Identity enrichment is best-effort; an unreachable CRM must not
        // block the call.
        let identity = match self.identity.resolve(&request.to_number).await {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Caller identity lookup failed, dialing without it");
                Default::default()
            }
        };

        let call_log_id = self
            .repo
            .create(&NewCallLog {
                to_number: request.to_number.clone(),
                from_number: from_number.clone(),
                direction: "outbound".to_string(),
                contact_id: identity.contact_id,
                company_id: identity.company_id,
                user_id: request.user_id,
                provider_session_id: None,
            })
            .await?;

        let mut session = CallSession::new(call_log_id, request.to_number.clone(), from_number.clone());
        session.contact_id = identity.contact_id;
        session.company_id = identity.company_id;
        session.user_id = request.user_id;
        let session_id = session.session_id.clone();

        self.store.insert(session).await?;

        // Leg A: the PSTN call to the dialed number
        let pstn_state = ClientState::new(&session_id, LegKind::Pstn, call_log_id).encode();
        let pstn_id = match self
            .api
            .create_pstn_leg(
                &request.to_number,
                &from_number,
                &pstn_state,
                self.config.pstn_ring_timeout_secs,
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.store.remove(&session_id).await;
                return Err(e);
            }
        };
        self.store
            .attach_leg(&session_id, LegKind::Pstn, &pstn_id)
            .await?;

        // Leg B: the SIP call to the operator's phone
        let sip_state = ClientState::new(&session_id, LegKind::Sip, call_log_id).encode();
        let sip_id = match self
            .api
            .create_sip_leg(
                &sip_address,
                &from_number,
                &sip_state,
                self.config.sip_ring_timeout_secs,
            )
            .await
        {
            Ok(id) => id,
            Err(e) => {
                // Tear down the half-built call before surfacing the error
                if let Err(hangup_err) = self.api.hangup(&pstn_id).await {
                    warn!(error = %hangup_err, "Failed to tear down PSTN leg after SIP leg failure");
                }
                self.store.remove(&session_id).await;
                return Err(e);
            }
        };
        self.store
            .attach_leg(&session_id, LegKind::Sip, &sip_id)
            .await?;

        info!(
            session_id = %session_id,
            call_log_id,
            pstn_leg = %pstn_id,
            sip_leg = %sip_id,
            "Outbound call placed"
        );

        self.publisher.publish(CallEvent::Connecting {
            session_id: session_id.clone(),
            call_log_id,
            to_number: request.to_number,
        });

        Ok(DialOutcome {
            session_id,
            call_log_id,
        })
    }

    /// Client-requested teardown: hang up whatever legs are still live.
    ///
    /// Best-effort: the terminal bookkeeping happens when the hangup
    /// callbacks arrive, exactly as for any other hangup.
    #[instrument(skip(self))]
    pub async fn request_hangup(&self, session_id: &str) -> AppResult<()> {
        let session = self
            .store
            .get(session_id)
            .await
            .ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;

        for kind in [LegKind::Pstn, LegKind::Sip] {
            if let Some(leg) = session.leg(kind) {
                if leg.status != LegStatus::Hangup {
                    if let Err(e) = self.api.hangup(&leg.call_control_id).await {
                        warn!(
                            session_id,
                            leg = %kind,
                            error = %e,
                            "Hangup request failed"
                        );
                    }
                }
            }
        }

        Ok(())
    }
}
