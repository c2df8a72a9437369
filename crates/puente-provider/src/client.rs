//! HTTP client for the provider's call-control REST API
//!
//! Thin wrapper around the five operations the engine needs. Every method
//! is a blocking network call from the engine's point of view; callers are
//! expected not to hold the session store lock across them.

use puente_core::traits::CallControlApi;
use puente_core::{AppConfig, AppError};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Errors from the call-control provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP error: status {status}: {detail}")]
    Http { status: u16, detail: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::Provider(err.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct CreateCallResponse {
    data: CallData,
}

#[derive(Debug, Deserialize)]
struct CallData {
    call_control_id: String,
}

#[derive(Debug, Deserialize)]
struct ConnectionResponse {
    data: ConnectionData,
}

#[derive(Debug, Deserialize)]
struct ConnectionData {
    sip_address: String,
}

/// REST client for the call-control provider
pub struct CallControlClient {
    http_client: Client,
    base_url: String,
    api_key: String,
    connection_id: String,
}

impl CallControlClient {
    /// Create a new client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Provider API root (e.g. "https://api.provider.com/v2")
    /// * `api_key` - Bearer token
    /// * `connection_id` - SIP connection the operator phones register against
    /// * `timeout_ms` - Per-request timeout in milliseconds
    pub fn new(
        base_url: &str,
        api_key: &str,
        connection_id: &str,
        timeout_ms: u64,
    ) -> Result<Self, ProviderError> {
        let http_client = ClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            connection_id: connection_id.to_string(),
        })
    }

    /// Create a client from the application config
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        if config.provider.api_key.is_empty() {
            return Err(ProviderError::Config("provider.api_key not set".to_string()));
        }
        Self::new(
            &config.provider.base_url,
            &config.provider.api_key,
            &config.provider.connection_id,
            config.provider.timeout_ms,
        )
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Provider request");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                detail,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    async fn post_action(&self, path: &str, body: serde_json::Value) -> Result<StatusCode, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Provider action");

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Connection(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(status);
        }

        let detail = response.text().await.unwrap_or_default();
        Err(ProviderError::Http {
            status: status.as_u16(),
            detail,
        })
    }
}

/// Statuses that mean "this call is already gone" on a hangup command.
/// The provider races its own teardown against ours; losing that race is
/// the expected case, not a failure.
fn is_already_ended(status: u16) -> bool {
    status == 404 || status == 422
}

#[async_trait]
impl CallControlApi for CallControlClient {
    #[instrument(skip(self, client_state))]
    async fn create_pstn_leg(
        &self,
        to: &str,
        from: &str,
        client_state: &str,
        ring_timeout_secs: u32,
    ) -> Result<String, AppError> {
        let body = json!({
            "to": to,
            "from": from,
            "connection_id": self.connection_id,
            "client_state": client_state,
            "timeout_secs": ring_timeout_secs,
        });

        let response: CreateCallResponse = self
            .post_json("/calls", body)
            .await
            .map_err(|e| AppError::LegCreation(e.to_string()))?;

        debug!(call_control_id = %response.data.call_control_id, "PSTN leg created");
        Ok(response.data.call_control_id)
    }

    #[instrument(skip(self, client_state))]
    async fn create_sip_leg(
        &self,
        sip_address: &str,
        from: &str,
        client_state: &str,
        ring_timeout_secs: u32,
    ) -> Result<String, AppError> {
        let body = json!({
            "to": sip_address,
            "from": from,
            "connection_id": self.connection_id,
            "client_state": client_state,
            "timeout_secs": ring_timeout_secs,
        });

        let response: CreateCallResponse = self
            .post_json("/calls", body)
            .await
            .map_err(|e| AppError::LegCreation(e.to_string()))?;

        debug!(call_control_id = %response.data.call_control_id, "SIP leg created");
        Ok(response.data.call_control_id)
    }

    #[instrument(skip(self))]
    async fn bridge(
        &self,
        call_control_id: &str,
        other_call_control_id: &str,
    ) -> Result<(), AppError> {
        let path = format!("/calls/{call_control_id}/actions/bridge");
        let body = json!({ "call_control_id": other_call_control_id });

        self.post_action(&path, body)
            .await
            .map_err(|e| AppError::Bridge(e.to_string()))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn hangup(&self, call_control_id: &str) -> Result<(), AppError> {
        let path = format!("/calls/{call_control_id}/actions/hangup");

        match self.post_action(&path, json!({})).await {
            Ok(_) => Ok(()),
            Err(ProviderError::Http { status, .. }) if is_already_ended(status) => {
                debug!(call_control_id, status, "Hangup on already-ended call");
                Ok(())
            }
            Err(e) => Err(AppError::Provider(e.to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn start_recording(&self, call_control_id: &str) -> Result<(), AppError> {
        let path = format!("/calls/{call_control_id}/actions/record_start");
        let body = json!({ "format": "mp3", "channels": "dual" });

        match self.post_action(&path, body).await {
            Ok(_) => Ok(()),
            Err(e) => {
                // Best-effort by contract: surface the error, callers log it
                warn!(call_control_id, error = %e, "Recording start failed");
                Err(AppError::Provider(e.to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn resolve_sip_address(&self) -> Result<String, AppError> {
        let url = format!("{}/connections/{}", self.base_url, self.connection_id);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Credentials(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Credentials(format!("status {status}: {detail}")));
        }

        let parsed: ConnectionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Credentials(e.to_string()))?;

        Ok(parsed.data.sip_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_ended_statuses() {
        assert!(is_already_ended(404));
        assert!(is_already_ended(422));
        assert!(!is_already_ended(500));
        assert!(!is_already_ended(200));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client =
            CallControlClient::new("https://api.example.com/v2/", "key", "conn-1", 1000).unwrap();
        assert_eq!(client.base_url, "https://api.example.com/v2");
    }

    #[test]
    fn test_from_config_requires_api_key() {
        let config = AppConfig {
            server: puente_core::config::ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                workers: 1,
                cors_origins: String::new(),
            },
            database: puente_core::config::DatabaseConfig {
                url: "postgresql://localhost/puente".to_string(),
                max_connections: 5,
            },
            provider: puente_core::config::ProviderConfig {
                base_url: "https://api.example.com/v2".to_string(),
                api_key: String::new(),
                connection_id: "conn-1".to_string(),
                caller_numbers: vec![],
                timeout_ms: 1000,
            },
            engine: puente_core::config::EngineConfig::default(),
        };

        assert!(CallControlClient::from_config(&config).is_err());
    }

    #[test]
    fn test_create_call_response_parses() {
        let raw = r#"{"data":{"call_control_id":"v3:abc123"}}"#;
        let parsed: CreateCallResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.data.call_control_id, "v3:abc123");
    }
}
