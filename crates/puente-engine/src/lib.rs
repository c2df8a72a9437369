//! Call bridging engine for Puente
//!
//! This crate orchestrates the two-leg outbound call flow:
//!
//! - `Dialer` - places both legs, registers the session, tears down
//!   partial setups
//! - `WebhookProcessor` - the state machine consuming provider callbacks,
//!   bridging when both legs are answered and cleaning up on hangup
//! - `CallRecordFinalizer` - terminal bookkeeping on the durable call
//!   record
//!
//! # Architecture
//!
//! Services are composable and testable:
//! - Each service is generic over the collaborator traits in `puente-core`
//! - Services are wrapped in Arc for safe sharing across async tasks
//! - All operations are instrumented with tracing
//! - Webhook processing never returns an error to the caller; delivery
//!   failures are absorbed after logging

pub mod dialer;
pub mod finalizer;
pub mod processor;

pub use dialer::{DialOutcome, DialRequest, Dialer};
pub use finalizer::CallRecordFinalizer;
pub use processor::WebhookProcessor;

#[cfg(test)]
pub(crate) mod testing;
