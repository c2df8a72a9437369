//! Call outcome derivation
//!
//! Maps the provider's hangup cause plus whether the call was ever answered
//! to the terminal classification stored on the call record. Computed once,
//! at hangup; never stored on the session.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hangup cause as reported by the provider on a hangup callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HangupCause {
    /// Clean teardown of an established or ringing call
    NormalClearing,
    /// Callee was busy
    UserBusy,
    /// Ring timeout elapsed without an answer
    NoAnswer,
    /// The originator cancelled before the callee answered
    OriginatorCancel,
    /// Any cause this engine does not classify specifically
    Other(String),
}

impl HangupCause {
    /// Parse the provider's wire string. Unknown strings are preserved
    /// verbatim in `Other` so they survive into logs and the call record.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "normal_clearing" => HangupCause::NormalClearing,
            "user_busy" | "busy" => HangupCause::UserBusy,
            "no_answer" | "timeout" => HangupCause::NoAnswer,
            "originator_cancel" => HangupCause::OriginatorCancel,
            other => HangupCause::Other(other.to_string()),
        }
    }

    /// Wire representation, round-trips for the known causes
    pub fn as_str(&self) -> &str {
        match self {
            HangupCause::NormalClearing => "normal_clearing",
            HangupCause::UserBusy => "user_busy",
            HangupCause::NoAnswer => "no_answer",
            HangupCause::OriginatorCancel => "originator_cancel",
            HangupCause::Other(raw) => raw,
        }
    }
}

impl fmt::Display for HangupCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal classification of a finished call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Completed,
    Busy,
    NoAnswer,
    Cancelled,
    Failed,
}

impl CallOutcome {
    /// Derive the outcome from the hangup cause and whether the call had
    /// ever reached answered.
    ///
    /// An unclassified cause on an answered call still counts as completed:
    /// the parties talked, however the provider labeled the teardown.
    pub fn derive(cause: &HangupCause, was_answered: bool) -> Self {
        match cause {
            HangupCause::NormalClearing => CallOutcome::Completed,
            HangupCause::UserBusy => CallOutcome::Busy,
            HangupCause::NoAnswer => CallOutcome::NoAnswer,
            HangupCause::OriginatorCancel => CallOutcome::Cancelled,
            HangupCause::Other(_) => {
                if was_answered {
                    CallOutcome::Completed
                } else {
                    CallOutcome::Failed
                }
            }
        }
    }

    /// Stable string stored on the call record
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Completed => "completed",
            CallOutcome::Busy => "busy",
            CallOutcome::NoAnswer => "no_answer",
            CallOutcome::Cancelled => "cancelled",
            CallOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_causes() {
        assert_eq!(HangupCause::parse("normal_clearing"), HangupCause::NormalClearing);
        assert_eq!(HangupCause::parse("user_busy"), HangupCause::UserBusy);
        assert_eq!(HangupCause::parse("timeout"), HangupCause::NoAnswer);
        assert_eq!(HangupCause::parse("originator_cancel"), HangupCause::OriginatorCancel);
    }

    #[test]
    fn test_parse_unknown_cause_preserved() {
        let cause = HangupCause::parse("recovery_on_timer_expire");
        assert_eq!(cause, HangupCause::Other("recovery_on_timer_expire".to_string()));
        assert_eq!(cause.as_str(), "recovery_on_timer_expire");
    }

    #[test]
    fn test_derive_completed() {
        let outcome = CallOutcome::derive(&HangupCause::NormalClearing, true);
        assert_eq!(outcome, CallOutcome::Completed);

        // Normal clearing on a never-answered call still reads as completed;
        // the duration will be zero.
        let outcome = CallOutcome::derive(&HangupCause::NormalClearing, false);
        assert_eq!(outcome, CallOutcome::Completed);
    }

    #[test]
    fn test_derive_no_answer() {
        let outcome = CallOutcome::derive(&HangupCause::NoAnswer, false);
        assert_eq!(outcome, CallOutcome::NoAnswer);
    }

    #[test]
    fn test_derive_unknown_cause() {
        let cause = HangupCause::Other("proxy_error".to_string());
        assert_eq!(CallOutcome::derive(&cause, true), CallOutcome::Completed);
        assert_eq!(CallOutcome::derive(&cause, false), CallOutcome::Failed);
    }
}
