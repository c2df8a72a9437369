//! Call log repository implementation
//!
//! PostgreSQL-backed storage for call records and their linked activities.
//! Uses runtime queries (not compile-time macros) to avoid requiring a
//! database connection at build time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use puente_core::models::CallOutcome;
use puente_core::traits::{ActivityFields, CallLog, CallLogRepository, NewCallLog};
use puente_core::{AppError, AppResult};
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument};

/// PostgreSQL implementation of CallLogRepository
pub struct PgCallLogRepository {
    pool: PgPool,
}

impl PgCallLogRepository {
    /// Create a new call log repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const CALL_LOG_SELECT_COLUMNS: &str = r#"
    id, to_number, from_number,
    contact_id, company_id, user_id,
    outcome, answered_at, ended_at,
    duration_secs, recording_url
"#;

#[derive(Debug, sqlx::FromRow)]
struct CallLogRow {
    id: i64,
    to_number: String,
    from_number: String,
    contact_id: Option<i64>,
    company_id: Option<i64>,
    user_id: Option<i64>,
    outcome: Option<String>,
    answered_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    duration_secs: i64,
    recording_url: Option<String>,
}

impl From<CallLogRow> for CallLog {
    fn from(row: CallLogRow) -> Self {
        Self {
            id: row.id,
            to_number: row.to_number,
            from_number: row.from_number,
            contact_id: row.contact_id,
            company_id: row.company_id,
            user_id: row.user_id,
            outcome: row.outcome,
            answered_at: row.answered_at,
            ended_at: row.ended_at,
            duration_secs: row.duration_secs,
            recording_url: row.recording_url,
        }
    }
}

#[async_trait]
impl CallLogRepository for PgCallLogRepository {
    #[instrument(skip(self, log))]
    async fn create(&self, log: &NewCallLog) -> AppResult<i64> {
        debug!(to = %log.to_number, "Creating call log");

        let result = sqlx::query(
            r#"
            INSERT INTO call_logs (
                to_number, from_number, direction,
                contact_id, company_id, user_id,
                provider_session_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING id
            "#,
        )
        .bind(&log.to_number)
        .bind(&log.from_number)
        .bind(&log.direction)
        .bind(log.contact_id)
        .bind(log.company_id)
        .bind(log.user_id)
        .bind(&log.provider_session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create call log: {}", e);
            AppError::Database(format!("Failed to create call log: {}", e))
        })?;

        Ok(result.get("id"))
    }

    #[instrument(skip(self))]
    async fn mark_answered(&self, id: i64, at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE call_logs
            SET answered_at = COALESCE(answered_at, $2)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to mark call answered: {}", e)))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn finalize(
        &self,
        id: i64,
        outcome: CallOutcome,
        answered_at: Option<DateTime<Utc>>,
        ended_at: DateTime<Utc>,
        duration_secs: i64,
    ) -> AppResult<bool> {
        // The `outcome IS NULL` guard makes finalization first-writer-wins:
        // a record that is already terminal is never rewritten.
        let result = sqlx::query(
            r#"
            UPDATE call_logs
            SET outcome = $2,
                answered_at = COALESCE($3, answered_at),
                ended_at = $4,
                duration_secs = $5
            WHERE id = $1 AND outcome IS NULL
            "#,
        )
        .bind(id)
        .bind(outcome.as_str())
        .bind(answered_at)
        .bind(ended_at)
        .bind(duration_secs)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to finalize call log {}: {}", id, e);
            AppError::Database(format!("Failed to finalize call log: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn attach_recording(&self, id: i64, url: &str) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE call_logs
            SET recording_url = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(url)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Failed to attach recording: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::CallLogNotFound(id.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self, activity))]
    async fn create_activity(&self, call_log_id: i64, activity: &ActivityFields) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO call_activities (
                call_log_id, user_id, contact_id, company_id,
                duration_secs, outcome, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            "#,
        )
        .bind(call_log_id)
        .bind(activity.user_id)
        .bind(activity.contact_id)
        .bind(activity.company_id)
        .bind(activity.duration_secs)
        .bind(activity.outcome.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create activity for call {}: {}", call_log_id, e);
            AppError::Database(format!("Failed to create activity: {}", e))
        })?;

        debug!(call_log_id, "Activity created");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_by_provider_session(
        &self,
        provider_session_id: &str,
    ) -> AppResult<Option<CallLog>> {
        let query = format!(
            "SELECT {} FROM call_logs WHERE provider_session_id = $1",
            CALL_LOG_SELECT_COLUMNS
        );

        let row = sqlx::query_as::<sqlx::Postgres, CallLogRow>(&query)
            .bind(provider_session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to look up call log: {}", e);
                AppError::Database(format!("Failed to look up call log: {}", e))
            })?;

        Ok(row.map(Into::into))
    }
}
