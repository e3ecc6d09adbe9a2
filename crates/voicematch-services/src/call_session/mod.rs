//! Outgoing and accepted call sessions
//!
//! `state` holds the pure transition table; `controller` runs it on a
//! tokio task with the polling, watchdog and billing timers.

mod controller;
mod state;

pub use controller::{CallCommand, CallSessionController, CallSessionHandle};
pub use state::{CallOutcome, CallPhase, CallSession, CallStatus, EndCall, Transition};
