//! Client-side controllers for VoiceMatch
//!
//! Each controller owns one user-facing flow and talks to the backend only
//! through `VoiceMatchApi`:
//!
//! - `CallSessionController` - Outgoing and accepted calls: status polling,
//!   ringing watchdog, local billing estimate, hang-up settlement
//! - `IncomingCallWatcher` - Listener-side offer polling, accept and reject
//! - `HeartbeatService` - Listener presence heartbeats
//! - `KycWizard` - Listener identity verification flow
//! - `RatingEpilogue` - Post-call rating and reporting
//!
//! # Concurrency
//!
//! Long-lived controllers run as tokio tasks. Their timers and network
//! results are serialized through one `select!` loop per task, state is
//! published over `watch` channels, and dropping a handle cancels the task.

pub mod call_session;
pub mod epilogue;
pub mod incoming;
pub mod kyc_wizard;
pub mod presence;
pub mod registry;

pub use call_session::{
    CallCommand, CallOutcome, CallSession, CallSessionController, CallSessionHandle, CallStatus,
};
pub use epilogue::{report_user, RatingEpilogue};
pub use incoming::{IncomingCallHandle, IncomingCallWatcher, LogAlert, OfferAlert, OfferTracker};
pub use kyc_wizard::{KycState, KycStep, KycWizard};
pub use presence::{set_online, HeartbeatService};
pub use registry::{SessionClaim, SessionRegistry};
