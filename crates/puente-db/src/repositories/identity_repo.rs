//! Caller identity lookup
//!
//! Matches a dialed number against the CRM's contacts table so the call
//! record and activity can be linked to the right contact and company.

use async_trait::async_trait;
use puente_core::traits::{CallerIdentity, IdentityResolver};
use puente_core::{AppError, AppResult};
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

/// PostgreSQL implementation of IdentityResolver
pub struct PgIdentityResolver {
    pool: PgPool,
}

impl PgIdentityResolver {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityResolver for PgIdentityResolver {
    #[instrument(skip(self))]
    async fn resolve(&self, phone_number: &str) -> AppResult<CallerIdentity> {
        let row = sqlx::query(
            r#"
            SELECT id, company_id
            FROM contacts
            WHERE phone_number = $1
            LIMIT 1
            "#,
        )
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Contact lookup failed: {}", e)))?;

        let identity = match row {
            Some(row) => CallerIdentity {
                contact_id: Some(row.get("id")),
                company_id: row.get("company_id"),
            },
            None => CallerIdentity::default(),
        };

        debug!(phone_number, found = identity.contact_id.is_some(), "Identity resolved");
        Ok(identity)
    }
}
