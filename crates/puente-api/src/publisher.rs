//! Broadcast-backed event fan-out
//!
//! One sender side lives in the engine services; every WebSocket session
//! holds a receiver. Clients that fall behind lose old events rather than
//! back-pressuring the engine; a browser that lagged through a call's
//! events has nothing useful to do with them anyway.

use puente_core::models::CallEvent;
use puente_core::traits::EventPublisher;
use tokio::sync::broadcast;
use tracing::debug;

/// Default buffered events per receiver
const DEFAULT_CAPACITY: usize = 64;

/// Fan-out of normalized call events to all connected clients
pub struct BroadcastPublisher {
    tx: broadcast::Sender<CallEvent>,
}

impl BroadcastPublisher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// A receiver for one WebSocket session
    pub fn subscribe(&self) -> broadcast::Receiver<CallEvent> {
        self.tx.subscribe()
    }

    /// Number of currently connected receivers
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: CallEvent) {
        // send only fails when no receiver exists; publishing into the
        // void is fine
        if let Err(e) = self.tx.send(event) {
            debug!(event = %e.0.kind(), "No clients connected for event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let publisher = BroadcastPublisher::new();
        let mut rx = publisher.subscribe();

        publisher.publish(CallEvent::Ringing {
            session_id: "s-1".to_string(),
            call_log_id: 1,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "ringing");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_harmless() {
        let publisher = BroadcastPublisher::new();
        publisher.publish(CallEvent::Active {
            session_id: "s-1".to_string(),
            call_log_id: 1,
        });
        assert_eq!(publisher.receiver_count(), 0);
    }
}
