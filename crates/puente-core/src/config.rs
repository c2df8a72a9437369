//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub engine: EngineConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Allowed CORS origins, comma separated
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_cors_origins() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// Call-control provider configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Base URL of the provider's call-control REST API
    #[serde(default = "default_provider_url")]
    pub base_url: String,

    /// API key used as bearer token
    pub api_key: String,

    /// SIP connection identifier the operator phones register against
    pub connection_id: String,

    /// Outbound caller numbers rotated across PSTN legs
    #[serde(default)]
    pub caller_numbers: Vec<String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_provider_url() -> String {
    "https://api.call-control.example.com/v2".to_string()
}

fn default_provider_timeout_ms() -> u64 {
    10_000
}

/// Bridging engine configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Ring timeout for the PSTN leg in seconds
    #[serde(default = "default_pstn_ring_timeout")]
    pub pstn_ring_timeout_secs: u32,

    /// Ring timeout for the operator SIP leg in seconds
    #[serde(default = "default_sip_ring_timeout")]
    pub sip_ring_timeout_secs: u32,

    /// Age after which an in-flight session is evicted regardless of state
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Interval between eviction sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// TTL for the cached SIP credential address
    #[serde(default = "default_credential_ttl")]
    pub credential_ttl_secs: u64,

    /// Start recording on successfully bridged calls
    #[serde(default)]
    pub record_calls: bool,
}

fn default_pstn_ring_timeout() -> u32 {
    30
}

fn default_sip_ring_timeout() -> u32 {
    15
}

fn default_session_ttl() -> u64 {
    1800
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_credential_ttl() -> u64 {
    3600
}

impl AppConfig {
    /// Load configuration from environment and optional config file
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("server.cors_origins", "http://localhost:3000")?
            .set_default("database.max_connections", 10)?
            .set_default("provider.timeout_ms", 10_000)?
            .set_default("engine.pstn_ring_timeout_secs", 30)?
            .set_default("engine.sip_ring_timeout_secs", 15)?
            .set_default("engine.session_ttl_secs", 1800)?
            .set_default("engine.sweep_interval_secs", 300)?
            .set_default("engine.credential_ttl_secs", 3600)?
            .set_default("engine.record_calls", false)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with PUENTE_ prefix
            .add_source(
                Environment::with_prefix("PUENTE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("PUENTE").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pstn_ring_timeout_secs: 30,
            sip_ring_timeout_secs: 15,
            session_ttl_secs: 1800,
            sweep_interval_secs: 300,
            credential_ttl_secs: 3600,
            record_calls: false,
        }
    }
}
