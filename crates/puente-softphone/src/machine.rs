//! The dial state machine
//!
//! Pure transition table: no I/O, no clocks, no channels. Every quirk of
//! the flow is a guarded transition here, where a test can reach it:
//!
//! - auto-answer fires only while a dial is in flight and no local call
//!   object exists yet; an unexpected inbound call at any other moment
//!   is left for regular inbound handling
//! - server events are matched against the tracked session id; events for
//!   a stale or foreign session are ignored
//! - the arrival timeout only matters until the inbound leg shows up;
//!   a stale timer firing later is a no-op

use puente_core::models::CallEvent;
use std::time::Duration;

/// How long to wait for the inbound SIP leg before giving up
pub const DEFAULT_ARRIVAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Local UI state of the dialer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialerState {
    /// No call in progress
    Idle,
    /// Dial posted; waiting for our own SIP leg and the callee
    Connecting,
    /// The callee's phone is ringing
    Ringing,
    /// Bridged; conversation is live
    Active,
    /// Call finished; terminal display state until the next dial
    Ended,
}

/// Everything that can happen to the dialer
#[derive(Debug, Clone)]
pub enum Input {
    /// The operator pressed dial
    DialRequested { to_number: String },
    /// The server accepted the dial and returned the session id
    DialAccepted { session_id: String },
    /// The dial request itself failed
    DialFailed { reason: String },
    /// The soft-phone stack offers an inbound call
    InboundCall { call_id: String },
    /// A normalized event pushed from the server
    ServerEvent(CallEvent),
    /// The operator pressed hangup
    HangupPressed,
    /// The local arrival timeout fired
    ArrivalTimeout,
}

/// Side effects the driver must perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// POST the dial intent to the server
    PostDial { to_number: String },
    /// Answer the inbound leg: it is our own leg B
    AutoAnswer { call_id: String },
    /// Start the arrival timer
    ArmTimeout(Duration),
    /// Cancel the arrival timer
    DisarmTimeout,
    /// Hang up the local soft-phone call immediately
    HangupLocal,
    /// Ask the server to tear down both remote legs
    NotifyServerHangup { session_id: String },
    /// Drop all local call state
    Teardown,
    /// Show an error to the operator
    SurfaceError(String),
}

/// The pure state machine
#[derive(Debug)]
pub struct DialMachine {
    state: DialerState,
    session_id: Option<String>,
    local_call_id: Option<String>,
    arrival_timeout: Duration,
}

impl DialMachine {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_ARRIVAL_TIMEOUT)
    }

    pub fn with_timeout(arrival_timeout: Duration) -> Self {
        Self {
            state: DialerState::Idle,
            session_id: None,
            local_call_id: None,
            arrival_timeout,
        }
    }

    pub fn state(&self) -> DialerState {
        self.state
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Feed one input, get the actions to perform
    pub fn handle(&mut self, input: Input) -> Vec<Action> {
        match input {
            Input::DialRequested { to_number } => self.on_dial_requested(to_number),
            Input::DialAccepted { session_id } => self.on_dial_accepted(session_id),
            Input::DialFailed { reason } => self.on_dial_failed(reason),
            Input::InboundCall { call_id } => self.on_inbound_call(call_id),
            Input::ServerEvent(event) => self.on_server_event(event),
            Input::HangupPressed => self.on_hangup_pressed(),
            Input::ArrivalTimeout => self.on_arrival_timeout(),
        }
    }

    fn on_dial_requested(&mut self, to_number: String) -> Vec<Action> {
        match self.state {
            DialerState::Idle | DialerState::Ended => {
                self.state = DialerState::Connecting;
                self.session_id = None;
                self.local_call_id = None;
                vec![
                    Action::PostDial { to_number },
                    Action::ArmTimeout(self.arrival_timeout),
                ]
            }
            // A call is already in progress; ignore the double press
            _ => vec![],
        }
    }

    fn on_dial_accepted(&mut self, session_id: String) -> Vec<Action> {
        if self.state == DialerState::Connecting || self.state == DialerState::Ringing {
            self.session_id = Some(session_id);
        }
        vec![]
    }

    fn on_dial_failed(&mut self, reason: String) -> Vec<Action> {
        if self.state != DialerState::Connecting {
            return vec![];
        }
        self.reset(DialerState::Ended);
        vec![
            Action::DisarmTimeout,
            Action::Teardown,
            Action::SurfaceError(reason),
        ]
    }

    /// Auto-answer guard: a dial is in flight and no local call object
    /// exists, so this inbound call is our own leg B arriving.
    fn on_inbound_call(&mut self, call_id: String) -> Vec<Action> {
        let dial_in_flight =
            self.state == DialerState::Connecting || self.state == DialerState::Ringing;

        if dial_in_flight && self.local_call_id.is_none() {
            self.local_call_id = Some(call_id.clone());
            vec![Action::AutoAnswer { call_id }, Action::DisarmTimeout]
        } else {
            vec![]
        }
    }

    fn on_server_event(&mut self, event: CallEvent) -> Vec<Action> {
        // Events for a stale or foreign session must not touch this call
        if self.session_id.as_deref() != Some(event.session_id()) {
            return vec![];
        }

        match event {
            CallEvent::Connecting { .. } => vec![],
            CallEvent::Ringing { .. } => {
                if self.state == DialerState::Connecting {
                    self.state = DialerState::Ringing;
                }
                vec![]
            }
            CallEvent::Active { .. } => {
                if self.state == DialerState::Connecting || self.state == DialerState::Ringing {
                    self.state = DialerState::Active;
                }
                vec![]
            }
            CallEvent::Ended { error, .. } => {
                let had_local_call = self.local_call_id.is_some();
                self.reset(DialerState::Ended);

                let mut actions = vec![Action::DisarmTimeout];
                if had_local_call {
                    actions.push(Action::HangupLocal);
                }
                actions.push(Action::Teardown);
                if let Some(error) = error {
                    actions.push(Action::SurfaceError(error));
                }
                actions
            }
        }
    }

    /// Local hangup: the local leg drops immediately, the server tears
    /// down the remote legs, without waiting for the round trip.
    fn on_hangup_pressed(&mut self) -> Vec<Action> {
        if self.state == DialerState::Idle || self.state == DialerState::Ended {
            return vec![];
        }

        let session_id = self.session_id.take();
        let had_local_call = self.local_call_id.is_some();
        self.reset(DialerState::Ended);

        let mut actions = vec![Action::DisarmTimeout];
        if had_local_call {
            actions.push(Action::HangupLocal);
        }
        if let Some(session_id) = session_id {
            actions.push(Action::NotifyServerHangup { session_id });
        }
        actions.push(Action::Teardown);
        actions
    }

    /// The inbound leg never arrived
    fn on_arrival_timeout(&mut self) -> Vec<Action> {
        let waiting =
            self.state == DialerState::Connecting || self.state == DialerState::Ringing;

        // A stale timer after the leg arrived (or the call ended) is a no-op
        if !waiting || self.local_call_id.is_some() {
            return vec![];
        }

        let session_id = self.session_id.take();
        self.reset(DialerState::Ended);

        let mut actions = vec![];
        if let Some(session_id) = session_id {
            actions.push(Action::NotifyServerHangup { session_id });
        }
        actions.push(Action::Teardown);
        actions.push(Action::SurfaceError(
            "The call could not be connected to your phone".to_string(),
        ));
        actions
    }

    fn reset(&mut self, state: DialerState) {
        self.state = state;
        self.session_id = None;
        self.local_call_id = None;
    }
}

impl Default for DialMachine {
    fn default() -> Self {
        Self::new()
    }
}
