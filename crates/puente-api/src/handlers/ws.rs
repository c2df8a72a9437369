//! WebSocket handler for the call event stream
//!
//! Every connected browser gets the full normalized event stream; the
//! client filters on the session id it is tracking. Delivery is push:
//! each session holds a broadcast receiver fed by the engine.

use crate::BroadcastPublisher;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::{Message, Session};
use futures::StreamExt;
use puente_core::models::CallEvent;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// WebSocket connection handler
pub async fn ws_handler(
    req: HttpRequest,
    body: web::Payload,
    publisher: web::Data<BroadcastPublisher>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, session, msg_stream) = actix_ws::handle(&req, body)?;

    let client_ip = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();

    info!(client = %client_ip, "WebSocket connection established");

    let events = publisher.subscribe();
    actix_web::rt::spawn(async move {
        ws_session(session, msg_stream, events, client_ip).await;
    });

    Ok(response)
}

/// Handle one WebSocket session
async fn ws_session(
    mut session: Session,
    mut msg_stream: actix_ws::MessageStream,
    mut events: broadcast::Receiver<CallEvent>,
    client_ip: String,
) {
    let mut ping_interval = interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            // Handle incoming messages
            Some(msg) = msg_stream.next() => {
                match msg {
                    Ok(Message::Text(text)) => {
                        debug!(client = %client_ip, "Received text: {}", text);
                    }
                    Ok(Message::Ping(msg)) => {
                        if session.pong(&msg).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(reason)) => {
                        info!(client = %client_ip, "Client closed connection: {:?}", reason);
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(client = %client_ip, "WebSocket error: {}", e);
                        break;
                    }
                }
            }

            // Push call events as the engine emits them
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if session.text(json).await.is_err() {
                                warn!(client = %client_ip, "Failed to push event, closing connection");
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // A slow client loses old events rather than
                        // stalling the engine
                        warn!(client = %client_ip, missed, "Client lagged behind event stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }

            // Keep the connection alive
            _ = ping_interval.tick() => {
                if session.ping(b"").await.is_err() {
                    warn!(client = %client_ip, "Failed to send ping, closing connection");
                    break;
                }
            }
        }
    }

    info!(client = %client_ip, "WebSocket connection closed");
    let _ = session.close(None).await;
}
