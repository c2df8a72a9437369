//! API layer for Puente
//!
//! HTTP surface of the bridging engine: the dial and hangup endpoints the
//! dialer UI calls, the webhook ingress the provider posts callbacks to,
//! and the WebSocket channel that streams normalized call events out to
//! connected browsers.

pub mod dto;
pub mod handlers;
pub mod publisher;

pub use dto::ApiResponse;
pub use handlers::{configure_calls, configure_webhooks, ws_handler};
pub use publisher::BroadcastPublisher;

use puente_db::{PgCallLogRepository, PgIdentityResolver};
use puente_engine::{Dialer, WebhookProcessor};
use puente_provider::CallControlClient;

/// The dialer as wired in production
pub type AppDialer =
    Dialer<CallControlClient, PgCallLogRepository, PgIdentityResolver, BroadcastPublisher>;

/// The webhook processor as wired in production
pub type AppProcessor =
    WebhookProcessor<CallControlClient, PgCallLogRepository, BroadcastPublisher>;
