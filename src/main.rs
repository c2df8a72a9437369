//! Puente server
//!
//! Outbound call bridging engine: places two-leg calls through the
//! call-control provider, consumes its webhooks, and streams normalized
//! call events to connected dialer UIs.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use puente_api::{
    configure_calls, configure_webhooks, ws_handler, AppDialer, AppProcessor, BroadcastPublisher,
};
use puente_core::AppConfig;
use puente_db::{create_pool, PgCallLogRepository, PgIdentityResolver};
use puente_engine::{Dialer, WebhookProcessor};
use puente_provider::{CallControlClient, CallerIdPool, SipAddressCache};
use puente_store::{spawn_sweeper, SessionStore};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Health check endpoint
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "puente",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Configure API routes
fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health_check))
            .configure(configure_calls),
    )
    .service(web::scope("/webhooks").configure(configure_webhooks));
}

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "puente={},puente_api={},puente_engine={},puente_provider={},actix_web=info,sqlx=warn",
            log_level, log_level, log_level, log_level
        ))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .init();
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting Puente v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().expect("Failed to load configuration");

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections))
        .await
        .expect("Failed to create database pool");

    // Collaborators
    let repo = Arc::new(PgCallLogRepository::new(pool.clone()));
    let identity = Arc::new(PgIdentityResolver::new(pool.clone()));
    let provider = Arc::new(
        CallControlClient::from_config(&config).expect("Failed to create provider client"),
    );
    let publisher = Arc::new(BroadcastPublisher::new());

    // Session registry and its eviction sweep. In-flight sessions live
    // only in this process; a restart loses them by design and the sweep
    // plus provider-side ring timeouts clean up the remains.
    let store = SessionStore::new();
    spawn_sweeper(
        store.clone(),
        Duration::from_secs(config.engine.sweep_interval_secs),
        Duration::from_secs(config.engine.session_ttl_secs),
    );
    info!(
        ttl_secs = config.engine.session_ttl_secs,
        sweep_secs = config.engine.sweep_interval_secs,
        "Session sweeper started"
    );

    let sip_cache = Arc::new(SipAddressCache::new(
        provider.clone(),
        Duration::from_secs(config.engine.credential_ttl_secs),
    ));
    let caller_ids = Arc::new(CallerIdPool::new(config.provider.caller_numbers.clone()));

    let dialer: AppDialer = Dialer::new(
        provider.clone(),
        repo.clone(),
        identity,
        publisher.clone(),
        store.clone(),
        sip_cache,
        caller_ids,
        config.engine.clone(),
    );
    let processor: AppProcessor = WebhookProcessor::new(
        provider,
        repo,
        publisher.clone(),
        store.clone(),
        config.engine.clone(),
    );

    let dialer = web::Data::new(dialer);
    let processor = web::Data::new(processor);
    let publisher_data = web::Data::from(publisher);
    let store_data = web::Data::new(store);

    let bind_addr = config.server_addr();
    let workers = config.server.workers;
    let cors_origins = config.server.cors_origins.clone();
    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, workers
    );

    HttpServer::new(move || {
        let cors_origins_inner = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                let origins: Vec<&str> = cors_origins_inner.split(',').collect();
                if let Ok(origin_str) = origin.to_str() {
                    origins.iter().any(|o| o.trim() == origin_str)
                } else {
                    false
                }
            })
            .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .app_data(dialer.clone())
            .app_data(processor.clone())
            .app_data(publisher_data.clone())
            .app_data(store_data.clone())
            .wrap(cors)
            .wrap(tracing_actix_web::TracingLogger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(configure_routes)
            // WebSocket endpoint for the normalized call event stream
            .route("/ws", web::get().to(ws_handler))
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await
}
