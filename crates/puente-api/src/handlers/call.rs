//! Call handlers
//!
//! HTTP handlers for placing calls, requesting teardown, and monitoring
//! in-flight sessions.

use crate::dto::{ActiveSessionResponse, ApiResponse, DialCallRequest, DialCallResponse};
use crate::AppDialer;
use actix_web::{web, HttpResponse};
use puente_core::AppError;
use puente_engine::DialRequest;
use puente_store::SessionStore;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

/// Place an outbound call
///
/// POST /api/v1/calls
///
/// Returns once both legs have been requested from the provider, not once
/// they are answered. A failure here means leg creation itself failed and
/// any partially created leg has already been torn down.
#[instrument(skip(dialer, req))]
pub async fn dial_call(
    dialer: web::Data<AppDialer>,
    req: web::Json<DialCallRequest>,
) -> Result<HttpResponse, AppError> {
    req.validate().map_err(|e| {
        warn!("Dial request validation failed: {}", e);
        AppError::Validation(e.to_string())
    })?;

    let outcome = dialer
        .dial(DialRequest {
            to_number: req.to_number.clone(),
            from_number: req.from_number.clone(),
            user_id: req.user_id,
        })
        .await?;

    info!(session_id = %outcome.session_id, "Dial accepted");

    Ok(HttpResponse::Created().json(ApiResponse::success(DialCallResponse {
        session_id: outcome.session_id,
        call_log_id: outcome.call_log_id,
    })))
}

/// Tear down both legs of a session
///
/// POST /api/v1/calls/{session_id}/hangup
#[instrument(skip(dialer))]
pub async fn hangup_call(
    dialer: web::Data<AppDialer>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let session_id = path.into_inner();
    dialer.request_hangup(&session_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// List in-flight sessions
///
/// GET /api/v1/calls
#[instrument(skip(store))]
pub async fn list_calls(store: web::Data<Arc<SessionStore>>) -> Result<HttpResponse, AppError> {
    let sessions = store.list().await;
    let calls: Vec<ActiveSessionResponse> =
        sessions.iter().map(ActiveSessionResponse::from).collect();

    Ok(HttpResponse::Ok().json(ApiResponse::success(calls)))
}

/// Configure call routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/calls")
            .route("", web::post().to(dial_call))
            .route("", web::get().to(list_calls))
            .route("/{session_id}/hangup", web::post().to(hangup_call)),
    );
}
