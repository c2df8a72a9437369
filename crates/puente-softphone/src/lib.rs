//! Client-side dial controller for Puente
//!
//! The browser half of the bridging engine. The soft-phone SDK and the
//! server push channel both deliver callbacks in whatever order the
//! network produces; this crate turns them into a fixed transition table
//! over an explicit state enum instead of conditionals scattered through
//! event handlers.
//!
//! `DialMachine` is the pure table: inputs go in, `(state, actions)` come
//! out, no I/O anywhere. `DialController` drives it, applying actions
//! through the `SoftPhone` and `DialGateway` traits and owning the local
//! arrival timeout.

pub mod controller;
pub mod machine;

pub use controller::{DialController, DialGateway, DialTicket, DialerError, SoftPhone};
pub use machine::{Action, DialMachine, DialerState, Input};
