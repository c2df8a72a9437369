//! Provider webhook ingress
//!
//! The provider retries failed deliveries indefinitely, so this endpoint
//! acknowledges with 200 no matter what: unparseable bodies and events the
//! processor could not route are logged and dropped, never surfaced as a
//! failed delivery.

use crate::AppProcessor;
use actix_web::{web, HttpResponse};
use puente_provider::ProviderEvent;
use serde_json::json;
use tracing::{debug, instrument, warn};

/// Receive a call-control callback
///
/// POST /webhooks/call-control
#[instrument(skip(processor, body))]
pub async fn provider_webhook(
    processor: web::Data<AppProcessor>,
    body: web::Bytes,
) -> HttpResponse {
    let raw = String::from_utf8_lossy(&body);

    match ProviderEvent::parse(&raw) {
        Some(event) => {
            debug!(event_type = %event.event_type(), "Webhook received");
            processor.process(&event).await;
        }
        None => {
            warn!("Unparseable webhook body, acknowledging anyway");
        }
    }

    HttpResponse::Ok().json(json!({ "received": true }))
}

/// Configure webhook routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/call-control", web::post().to(provider_webhook));
}
