//! The dial controller driver
//!
//! Wraps `DialMachine` and performs its actions: posting the dial intent,
//! answering the local leg through the soft-phone SDK, arming the arrival
//! timer, and notifying the server on teardown. All I/O failures are
//! absorbed here; the machine only ever sees its defined inputs.

use crate::machine::{Action, DialMachine, DialerState, Input};
use async_trait::async_trait;
use puente_core::models::CallEvent;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

/// Client-side errors
#[derive(Debug, Error)]
pub enum DialerError {
    #[error("Server request failed: {0}")]
    Gateway(String),

    #[error("Soft phone error: {0}")]
    Phone(String),
}

/// What the server returns for an accepted dial
#[derive(Debug, Clone)]
pub struct DialTicket {
    pub session_id: String,
    pub call_log_id: i64,
}

/// The local soft-phone stack
#[async_trait]
pub trait SoftPhone: Send + Sync {
    /// Answer an inbound call by its local id
    async fn answer(&self, call_id: &str) -> Result<(), DialerError>;

    /// Hang up the current local call
    async fn hangup(&self) -> Result<(), DialerError>;
}

/// The server's dial API as seen from the browser
#[async_trait]
pub trait DialGateway: Send + Sync {
    /// POST the dial intent
    async fn post_dial(&self, to_number: &str) -> Result<DialTicket, DialerError>;

    /// Ask the server to tear down both remote legs
    async fn request_hangup(&self, session_id: &str) -> Result<(), DialerError>;
}

/// Drives the dial state machine against real collaborators
pub struct DialController<S, G> {
    machine: Mutex<DialMachine>,
    phone: Arc<S>,
    gateway: Arc<G>,
    timeout_task: Mutex<Option<JoinHandle<()>>>,
    last_error: Mutex<Option<String>>,
}

impl<S, G> DialController<S, G>
where
    S: SoftPhone + 'static,
    G: DialGateway + 'static,
{
    pub fn new(phone: Arc<S>, gateway: Arc<G>) -> Arc<Self> {
        Arc::new(Self {
            machine: Mutex::new(DialMachine::new()),
            phone,
            gateway,
            timeout_task: Mutex::new(None),
            last_error: Mutex::new(None),
        })
    }

    /// Controller with a custom arrival timeout (tests, slow networks)
    pub fn with_timeout(phone: Arc<S>, gateway: Arc<G>, arrival_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            machine: Mutex::new(DialMachine::with_timeout(arrival_timeout)),
            phone,
            gateway,
            timeout_task: Mutex::new(None),
            last_error: Mutex::new(None),
        })
    }

    /// The operator pressed dial
    pub async fn dial(self: &Arc<Self>, to_number: &str) {
        self.dispatch(Input::DialRequested {
            to_number: to_number.to_string(),
        })
        .await;
    }

    /// The soft-phone stack offers an inbound call
    pub async fn on_inbound_call(self: &Arc<Self>, call_id: &str) {
        self.dispatch(Input::InboundCall {
            call_id: call_id.to_string(),
        })
        .await;
    }

    /// A normalized event arrived on the push channel
    pub async fn on_server_event(self: &Arc<Self>, event: CallEvent) {
        self.dispatch(Input::ServerEvent(event)).await;
    }

    /// The operator pressed hangup
    pub async fn hangup(self: &Arc<Self>) {
        self.dispatch(Input::HangupPressed).await;
    }

    pub async fn state(&self) -> DialerState {
        self.machine.lock().await.state()
    }

    /// The most recent surfaced error, if any
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.lock().await.clone()
    }

    /// Run one input through the machine and perform the resulting
    /// actions. Actions that produce a follow-up input (the dial POST)
    /// feed back into the machine in the same pass.
    fn dispatch<'a>(
        self: &'a Arc<Self>,
        input: Input,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let mut queue = VecDeque::from([input]);

            while let Some(input) = queue.pop_front() {
                let actions = self.machine.lock().await.handle(input);
                for action in actions {
                    if let Some(followup) = self.apply(action).await {
                        queue.push_back(followup);
                    }
                }
            }
        })
    }

    async fn apply(self: &Arc<Self>, action: Action) -> Option<Input> {
        match action {
            Action::PostDial { to_number } => match self.gateway.post_dial(&to_number).await {
                Ok(ticket) => Some(Input::DialAccepted {
                    session_id: ticket.session_id,
                }),
                Err(e) => Some(Input::DialFailed {
                    reason: e.to_string(),
                }),
            },
            Action::AutoAnswer { call_id } => {
                if let Err(e) = self.phone.answer(&call_id).await {
                    warn!(call_id, error = %e, "Auto-answer failed");
                }
                None
            }
            Action::ArmTimeout(duration) => {
                self.arm_timeout(duration).await;
                None
            }
            Action::DisarmTimeout => {
                self.disarm_timeout().await;
                None
            }
            Action::HangupLocal => {
                if let Err(e) = self.phone.hangup().await {
                    warn!(error = %e, "Local hangup failed");
                }
                None
            }
            Action::NotifyServerHangup { session_id } => {
                if let Err(e) = self.gateway.request_hangup(&session_id).await {
                    // The server's TTL sweep covers sessions we fail to
                    // abandon explicitly
                    warn!(session_id, error = %e, "Server hangup request failed");
                }
                None
            }
            Action::Teardown => {
                self.disarm_timeout().await;
                None
            }
            Action::SurfaceError(message) => {
                warn!(%message, "Call failed");
                *self.last_error.lock().await = Some(message);
                None
            }
        }
    }

    async fn arm_timeout(self: &Arc<Self>, duration: Duration) {
        let controller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            controller.dispatch(Input::ArrivalTimeout).await;
        });

        let mut slot = self.timeout_task.lock().await;
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    async fn disarm_timeout(&self) {
        if let Some(handle) = self.timeout_task.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakePhone {
        answered: StdMutex<Vec<String>>,
        hangups: StdMutex<usize>,
    }

    #[async_trait]
    impl SoftPhone for FakePhone {
        async fn answer(&self, call_id: &str) -> Result<(), DialerError> {
            self.answered.lock().unwrap().push(call_id.to_string());
            Ok(())
        }

        async fn hangup(&self) -> Result<(), DialerError> {
            *self.hangups.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeGateway {
        fail_dial: AtomicBool,
        hangup_requests: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl DialGateway for FakeGateway {
        async fn post_dial(&self, _to_number: &str) -> Result<DialTicket, DialerError> {
            if self.fail_dial.load(Ordering::SeqCst) {
                return Err(DialerError::Gateway("server unavailable".to_string()));
            }
            Ok(DialTicket {
                session_id: "s-1".to_string(),
                call_log_id: 1,
            })
        }

        async fn request_hangup(&self, session_id: &str) -> Result<(), DialerError> {
            self.hangup_requests
                .lock()
                .unwrap()
                .push(session_id.to_string());
            Ok(())
        }
    }

    fn active(session_id: &str) -> CallEvent {
        CallEvent::Active {
            session_id: session_id.to_string(),
            call_log_id: 1,
        }
    }

    fn ended(session_id: &str) -> CallEvent {
        CallEvent::Ended {
            session_id: session_id.to_string(),
            call_log_id: 1,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_full_call_from_the_operator_side() {
        let phone = Arc::new(FakePhone::default());
        let gateway = Arc::new(FakeGateway::default());
        let controller = DialController::new(phone.clone(), gateway.clone());

        controller.dial("+15551234567").await;
        assert_eq!(controller.state().await, DialerState::Connecting);

        // Our leg B arrives and is answered automatically
        controller.on_inbound_call("local-42").await;
        assert_eq!(
            phone.answered.lock().unwrap().as_slice(),
            ["local-42".to_string()]
        );

        controller.on_server_event(active("s-1")).await;
        assert_eq!(controller.state().await, DialerState::Active);

        controller.on_server_event(ended("s-1")).await;
        assert_eq!(controller.state().await, DialerState::Ended);
        assert_eq!(*phone.hangups.lock().unwrap(), 1);
        assert!(controller.last_error().await.is_none());
    }

    #[tokio::test]
    async fn test_local_hangup_notifies_server_immediately() {
        let phone = Arc::new(FakePhone::default());
        let gateway = Arc::new(FakeGateway::default());
        let controller = DialController::new(phone.clone(), gateway.clone());

        controller.dial("+15551234567").await;
        controller.on_inbound_call("local-42").await;
        controller.hangup().await;

        assert_eq!(controller.state().await, DialerState::Ended);
        assert_eq!(*phone.hangups.lock().unwrap(), 1);
        assert_eq!(
            gateway.hangup_requests.lock().unwrap().as_slice(),
            ["s-1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_arrival_timeout_abandons_the_call() {
        let phone = Arc::new(FakePhone::default());
        let gateway = Arc::new(FakeGateway::default());
        let controller =
            DialController::with_timeout(phone, gateway.clone(), Duration::from_millis(20));

        controller.dial("+15551234567").await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(controller.state().await, DialerState::Ended);
        assert_eq!(
            gateway.hangup_requests.lock().unwrap().as_slice(),
            ["s-1".to_string()]
        );
        assert!(controller.last_error().await.is_some());
    }

    #[tokio::test]
    async fn test_inbound_leg_disarms_the_timeout() {
        let phone = Arc::new(FakePhone::default());
        let gateway = Arc::new(FakeGateway::default());
        let controller = DialController::with_timeout(
            phone.clone(),
            gateway.clone(),
            Duration::from_millis(20),
        );

        controller.dial("+15551234567").await;
        controller.on_inbound_call("local-42").await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        // Still in the call; the timer never fired
        assert_eq!(controller.state().await, DialerState::Connecting);
        assert!(gateway.hangup_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_dial_surfaces_error() {
        let phone = Arc::new(FakePhone::default());
        let gateway = Arc::new(FakeGateway::default());
        gateway.fail_dial.store(true, Ordering::SeqCst);
        let controller = DialController::new(phone, gateway);

        controller.dial("+15551234567").await;

        assert_eq!(controller.state().await, DialerState::Ended);
        assert!(controller
            .last_error()
            .await
            .unwrap()
            .contains("server unavailable"));
    }

    #[tokio::test]
    async fn test_events_for_previous_session_ignored() {
        let phone = Arc::new(FakePhone::default());
        let gateway = Arc::new(FakeGateway::default());
        let controller = DialController::new(phone, gateway);

        controller.dial("+15551234567").await;
        controller.on_server_event(ended("stale-session")).await;

        assert_eq!(controller.state().await, DialerState::Connecting);
    }
}
