//! Call record finalization
//!
//! Terminal bookkeeping on the durable call record: outcome, timing,
//! duration, and the linked activity for calls that actually connected.
//! Finalization is idempotent: a record that is already terminal is left
//! untouched, which makes duplicate hangup deliveries harmless.

use chrono::{DateTime, Utc};
use puente_core::models::CallOutcome;
use puente_core::traits::{ActivityFields, CallLogRepository};
use puente_core::AppResult;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Who the finished call should be attributed to on the activity record
#[derive(Debug, Clone, Default)]
pub struct ActivityContext {
    pub user_id: Option<i64>,
    pub contact_id: Option<i64>,
    pub company_id: Option<i64>,
}

/// Writes terminal state to the persistence collaborator
pub struct CallRecordFinalizer<R> {
    repo: Arc<R>,
}

impl<R: CallLogRepository> CallRecordFinalizer<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    /// Record the terminal outcome of a call.
    ///
    /// Duration is `ended_at - answered_at` when the call was ever
    /// answered, else zero. When the resulting duration is positive, a
    /// linked activity record is created as well.
    #[instrument(skip(self, context))]
    pub async fn finalize(
        &self,
        call_log_id: i64,
        outcome: CallOutcome,
        answered_at: Option<DateTime<Utc>>,
        ended_at: DateTime<Utc>,
        context: &ActivityContext,
    ) -> AppResult<()> {
        let duration_secs = answered_at
            .map(|a| (ended_at - a).num_seconds().max(0))
            .unwrap_or(0);

        let wrote = self
            .repo
            .finalize(call_log_id, outcome, answered_at, ended_at, duration_secs)
            .await?;

        if !wrote {
            debug!(call_log_id, "Call record already terminal, skipping finalize");
            return Ok(());
        }

        info!(
            call_log_id,
            outcome = %outcome,
            duration_secs,
            "Call record finalized"
        );

        if duration_secs > 0 {
            let activity = ActivityFields {
                user_id: context.user_id,
                contact_id: context.contact_id,
                company_id: context.company_id,
                duration_secs,
                outcome,
            };
            self.repo.create_activity(call_log_id, &activity).await?;
        }

        Ok(())
    }

    /// Attach a saved recording reference. No state-machine effect.
    #[instrument(skip(self))]
    pub async fn attach_recording(&self, call_log_id: i64, url: &str) -> AppResult<()> {
        if let Err(e) = self.repo.attach_recording(call_log_id, url).await {
            // Recording bookkeeping is never fatal to anything
            warn!(call_log_id, error = %e, "Failed to attach recording");
            return Err(e);
        }
        Ok(())
    }
}
