//! Call session state machine
//!
//! Pure, synchronous transitions. The controller feeds events in and acts
//! on the returned `Transition`; nothing here touches the network or a
//! timer. Once a session leaves `Ringing`/`Active` for a terminal phase,
//! every later event is ignored, which is what makes the end-call request
//! happen at most once.

use rust_decimal::Decimal;
use std::fmt;
use voicematch_core::billing::{format_clock, BillingMeter, CostEstimate};
use voicematch_core::models::{
    AcceptedCall, CallSummary, CallType, EndCallResponse, RemoteCallStatus, RoomCredentials,
    StartedCall,
};
use voicematch_core::{ClientError, ClientResult};

/// Client-visible call status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Connecting,
    Ringing,
    Active,
    Ended,
}

impl CallStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CallStatus::Connecting => "Connecting...",
            CallStatus::Ringing => "Ringing...",
            CallStatus::Active => "Connected",
            CallStatus::Ended => "Call Ended",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// Settled by the backend; hand-off to the rating epilogue
    Completed(CallSummary),
    /// The listener declined (busy)
    Rejected,
    /// Missed, ended before answer, or the ringing watchdog fired
    NoAnswer,
    /// The caller hung up before the call was answered
    Cancelled,
    StartFailed(String),
    EndFailed(String),
    /// The owner went away; no network call was made on the way out
    TornDown,
}

impl CallOutcome {
    /// User-facing notice for this outcome
    pub fn message(&self) -> String {
        match self {
            CallOutcome::Completed(_) => "Call ended".to_string(),
            CallOutcome::Rejected => "Listener is busy right now. Try again in a bit.".to_string(),
            CallOutcome::NoAnswer => "No answer. The listener didn't pick up.".to_string(),
            CallOutcome::Cancelled => "Call cancelled".to_string(),
            CallOutcome::StartFailed(detail) | CallOutcome::EndFailed(detail) => detail.clone(),
            CallOutcome::TornDown => "Call closed".to_string(),
        }
    }

    pub fn summary(&self) -> Option<&CallSummary> {
        match self {
            CallOutcome::Completed(summary) => Some(summary),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallPhase {
    Connecting { hangup_requested: bool },
    Ringing,
    Active {
        meter: BillingMeter,
        muted: bool,
        speaker: bool,
    },
    /// Timers stopped, waiting for the end-call settlement
    Ending { meter: BillingMeter },
    Ended(CallOutcome),
}

/// End-call request produced by a terminal transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndCall {
    pub call_id: String,
    /// `false` means best-effort: the outcome is already decided and the
    /// response is discarded
    pub settle: bool,
}

/// Effect of feeding one event to the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Ignored,
    Updated,
    /// Entered `Active`: start the billing ticker
    Activated,
    /// Left the live phases: stop every timer, then send the end-call if any
    Terminated(Option<EndCall>),
}

/// One call from the local user's point of view
#[derive(Debug, Clone, PartialEq)]
pub struct CallSession {
    phase: CallPhase,
    call_id: Option<String>,
    rate_per_min: Option<Decimal>,
    call_type: CallType,
    peer_name: Option<String>,
    room: Option<RoomCredentials>,
    is_first_call: bool,
    dots: u8,
}

impl CallSession {
    /// Outgoing call, before `calls/start` has answered
    pub fn outgoing(call_type: CallType, listener_name: Option<String>) -> Self {
        Self {
            phase: CallPhase::Connecting {
                hangup_requested: false,
            },
            call_id: None,
            rate_per_min: None,
            call_type,
            peer_name: listener_name,
            room: None,
            is_first_call: false,
            dots: 0,
        }
    }

    /// Accepted incoming call; skips connecting/ringing
    pub fn accepted(call: &AcceptedCall, fallback_rate: Decimal) -> Self {
        let rate = call.rate_per_min.unwrap_or(fallback_rate);
        Self {
            phase: CallPhase::Active {
                meter: BillingMeter::new(rate),
                muted: false,
                speaker: false,
            },
            call_id: Some(call.call_id().to_string()),
            rate_per_min: Some(rate),
            call_type: call.offer.call_type,
            peer_name: Some(call.offer.caller_name.clone()),
            room: call.room.clone(),
            is_first_call: false,
            dots: 0,
        }
    }

    // ==================== Events ====================

    /// `calls/start` answered
    pub fn on_started(&mut self, call: &StartedCall) -> Transition {
        let CallPhase::Connecting { hangup_requested } = self.phase else {
            return Transition::Ignored;
        };

        self.call_id = Some(call.id.clone());
        self.rate_per_min = Some(call.rate_per_min);
        self.room = call.room();
        self.is_first_call = call.is_first_call;

        if hangup_requested {
            self.phase = CallPhase::Ended(CallOutcome::Cancelled);
            return Transition::Terminated(Some(EndCall {
                call_id: call.id.clone(),
                settle: false,
            }));
        }

        self.phase = CallPhase::Ringing;
        Transition::Updated
    }

    /// `calls/start` failed; never retried
    pub fn on_start_failed(&mut self, error: &ClientError) -> Transition {
        if !matches!(self.phase, CallPhase::Connecting { .. }) {
            return Transition::Ignored;
        }
        self.phase = CallPhase::Ended(CallOutcome::StartFailed(error.to_string()));
        Transition::Terminated(None)
    }

    /// Result of a `calls/status` poll
    pub fn on_remote_status(&mut self, status: RemoteCallStatus) -> Transition {
        if self.phase != CallPhase::Ringing {
            return Transition::Ignored;
        }

        match status {
            RemoteCallStatus::Active => {
                let rate = self.rate_per_min.unwrap_or(Decimal::ZERO);
                self.phase = CallPhase::Active {
                    meter: BillingMeter::new(rate),
                    muted: false,
                    speaker: false,
                };
                Transition::Activated
            }
            RemoteCallStatus::Rejected => {
                self.phase = CallPhase::Ended(CallOutcome::Rejected);
                Transition::Terminated(None)
            }
            RemoteCallStatus::Missed | RemoteCallStatus::Ended => {
                self.phase = CallPhase::Ended(CallOutcome::NoAnswer);
                Transition::Terminated(None)
            }
            RemoteCallStatus::Pending => Transition::Ignored,
        }
    }

    /// The ringing watchdog expired
    pub fn on_watchdog(&mut self) -> Transition {
        if self.phase != CallPhase::Ringing {
            return Transition::Ignored;
        }
        self.phase = CallPhase::Ended(CallOutcome::NoAnswer);
        self.best_effort_end()
    }

    /// One billing second elapsed
    pub fn on_tick(&mut self) -> Transition {
        match &mut self.phase {
            CallPhase::Active { meter, .. } => {
                meter.tick();
                Transition::Updated
            }
            _ => Transition::Ignored,
        }
    }

    /// Connecting-dots animation step
    pub fn on_dots(&mut self) -> Transition {
        match self.phase {
            CallPhase::Connecting { .. } | CallPhase::Ringing => {
                self.dots = (self.dots + 1) % 4;
                Transition::Updated
            }
            _ => Transition::Ignored,
        }
    }

    /// Explicit user hang-up
    pub fn hang_up(&mut self) -> Transition {
        match &self.phase {
            CallPhase::Connecting { hangup_requested } => {
                if *hangup_requested {
                    return Transition::Ignored;
                }
                self.phase = CallPhase::Connecting {
                    hangup_requested: true,
                };
                Transition::Updated
            }
            CallPhase::Ringing => {
                self.phase = CallPhase::Ended(CallOutcome::Cancelled);
                self.best_effort_end()
            }
            CallPhase::Active { meter, .. } => {
                let Some(call_id) = self.call_id.clone() else {
                    return Transition::Ignored;
                };
                self.phase = CallPhase::Ending {
                    meter: meter.clone(),
                };
                Transition::Terminated(Some(EndCall {
                    call_id,
                    settle: true,
                }))
            }
            CallPhase::Ending { .. } | CallPhase::Ended(_) => Transition::Ignored,
        }
    }

    /// Settlement of a user-initiated end-call
    pub fn on_end_settled(&mut self, result: ClientResult<EndCallResponse>) -> Transition {
        let CallPhase::Ending { meter } = &self.phase else {
            return Transition::Ignored;
        };

        let outcome = match result {
            Ok(response) => {
                let estimate = meter.estimate();
                let call_id = self.call_id.as_deref().unwrap_or_default();
                CallOutcome::Completed(CallSummary::settle(
                    call_id,
                    &response,
                    estimate.elapsed_seconds,
                    estimate.amount,
                ))
            }
            Err(error) => CallOutcome::EndFailed(error.to_string()),
        };
        self.phase = CallPhase::Ended(outcome);
        Transition::Updated
    }

    pub fn toggle_mute(&mut self) -> Transition {
        match &mut self.phase {
            CallPhase::Active { muted, .. } => {
                *muted = !*muted;
                Transition::Updated
            }
            _ => Transition::Ignored,
        }
    }

    pub fn toggle_speaker(&mut self) -> Transition {
        match &mut self.phase {
            CallPhase::Active { speaker, .. } => {
                *speaker = !*speaker;
                Transition::Updated
            }
            _ => Transition::Ignored,
        }
    }

    /// Owner went away; no end-call is produced
    pub fn tear_down(&mut self) -> Transition {
        if matches!(self.phase, CallPhase::Ended(_)) {
            return Transition::Ignored;
        }
        self.phase = CallPhase::Ended(CallOutcome::TornDown);
        Transition::Terminated(None)
    }

    fn best_effort_end(&self) -> Transition {
        Transition::Terminated(self.call_id.clone().map(|call_id| EndCall {
            call_id,
            settle: false,
        }))
    }

    // ==================== Accessors ====================

    pub fn phase(&self) -> &CallPhase {
        &self.phase
    }

    pub fn status(&self) -> CallStatus {
        match self.phase {
            CallPhase::Connecting { .. } => CallStatus::Connecting,
            CallPhase::Ringing => CallStatus::Ringing,
            CallPhase::Active { .. } => CallStatus::Active,
            CallPhase::Ending { .. } | CallPhase::Ended(_) => CallStatus::Ended,
        }
    }

    #[inline]
    pub fn is_ringing(&self) -> bool {
        self.phase == CallPhase::Ringing
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self.phase, CallPhase::Active { .. })
    }

    #[inline]
    pub fn is_ended(&self) -> bool {
        matches!(self.phase, CallPhase::Ended(_))
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    pub fn rate_per_min(&self) -> Option<Decimal> {
        self.rate_per_min
    }

    pub fn call_type(&self) -> CallType {
        self.call_type
    }

    pub fn peer_name(&self) -> Option<&str> {
        self.peer_name.as_deref()
    }

    pub fn room(&self) -> Option<&RoomCredentials> {
        self.room.as_ref()
    }

    /// First call ever for this seeker (discounted rate)
    pub fn is_first_call(&self) -> bool {
        self.is_first_call
    }

    pub fn dots(&self) -> u8 {
        self.dots
    }

    pub fn is_muted(&self) -> bool {
        matches!(self.phase, CallPhase::Active { muted: true, .. })
    }

    pub fn is_speaker(&self) -> bool {
        matches!(self.phase, CallPhase::Active { speaker: true, .. })
    }

    /// Local estimate while the meter runs
    pub fn cost_estimate(&self) -> Option<CostEstimate> {
        match &self.phase {
            CallPhase::Active { meter, .. } | CallPhase::Ending { meter } => Some(meter.estimate()),
            _ => None,
        }
    }

    pub fn elapsed_seconds(&self) -> u64 {
        match &self.phase {
            CallPhase::Active { meter, .. } | CallPhase::Ending { meter } => meter.elapsed_seconds(),
            CallPhase::Ended(CallOutcome::Completed(summary)) => summary.duration_seconds,
            _ => 0,
        }
    }

    /// `MM:SS` for the in-call timer
    pub fn clock(&self) -> String {
        format_clock(self.elapsed_seconds())
    }

    pub fn outcome(&self) -> Option<&CallOutcome> {
        match &self.phase {
            CallPhase::Ended(outcome) => Some(outcome),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use voicematch_core::models::{AcceptCallResponse, IncomingCallOffer};

    fn started(id: &str) -> StartedCall {
        StartedCall {
            id: id.to_string(),
            rate_per_min: dec!(5),
            is_first_call: false,
            hms_room_id: None,
            hms_token: None,
        }
    }

    fn ringing() -> CallSession {
        let mut session = CallSession::outgoing(CallType::Voice, Some("Meera".to_string()));
        assert_eq!(session.on_started(&started("c-1")), Transition::Updated);
        session
    }

    fn active() -> CallSession {
        let mut session = ringing();
        assert_eq!(
            session.on_remote_status(RemoteCallStatus::Active),
            Transition::Activated
        );
        session
    }

    #[test]
    fn test_start_moves_to_ringing() {
        let session = ringing();
        assert_eq!(session.status(), CallStatus::Ringing);
        assert_eq!(session.call_id(), Some("c-1"));
        assert_eq!(session.rate_per_min(), Some(dec!(5)));
    }

    #[test]
    fn test_start_failure_is_terminal() {
        let mut session = CallSession::outgoing(CallType::Voice, None);
        let error = ClientError::api(400, Some("Insufficient balance".into()));
        let transition = session.on_start_failed(&error);
        assert_eq!(transition, Transition::Terminated(None));
        assert_eq!(
            session.outcome(),
            Some(&CallOutcome::StartFailed("Insufficient balance".to_string()))
        );
    }

    #[test]
    fn test_pending_status_keeps_ringing() {
        let mut session = ringing();
        assert_eq!(
            session.on_remote_status(RemoteCallStatus::Pending),
            Transition::Ignored
        );
        assert!(session.is_ringing());
    }

    #[test]
    fn test_rejected_and_missed_are_distinct() {
        let mut rejected = ringing();
        assert_eq!(
            rejected.on_remote_status(RemoteCallStatus::Rejected),
            Transition::Terminated(None)
        );
        assert_eq!(rejected.outcome(), Some(&CallOutcome::Rejected));

        let mut missed = ringing();
        missed.on_remote_status(RemoteCallStatus::Missed);
        assert_eq!(missed.outcome(), Some(&CallOutcome::NoAnswer));
        assert_ne!(
            CallOutcome::Rejected.message(),
            CallOutcome::NoAnswer.message()
        );
    }

    #[test]
    fn test_watchdog_requests_single_end_call() {
        let mut session = ringing();
        assert_eq!(
            session.on_watchdog(),
            Transition::Terminated(Some(EndCall {
                call_id: "c-1".to_string(),
                settle: false
            }))
        );
        assert_eq!(session.outcome(), Some(&CallOutcome::NoAnswer));

        // A second firing has nothing left to do
        assert_eq!(session.on_watchdog(), Transition::Ignored);
    }

    #[test]
    fn test_watchdog_after_rejection_is_ignored() {
        let mut session = ringing();
        session.on_remote_status(RemoteCallStatus::Rejected);
        assert_eq!(session.on_watchdog(), Transition::Ignored);
        assert_eq!(session.outcome(), Some(&CallOutcome::Rejected));
    }

    #[test]
    fn test_rejection_after_watchdog_is_ignored() {
        let mut session = ringing();
        session.on_watchdog();
        assert_eq!(
            session.on_remote_status(RemoteCallStatus::Rejected),
            Transition::Ignored
        );
        assert_eq!(session.outcome(), Some(&CallOutcome::NoAnswer));
    }

    #[test]
    fn test_ticks_only_count_while_active() {
        let mut session = ringing();
        assert_eq!(session.on_tick(), Transition::Ignored);
        assert_eq!(session.elapsed_seconds(), 0);

        let mut session = active();
        for _ in 0..90 {
            session.on_tick();
        }
        assert_eq!(session.elapsed_seconds(), 90);
        assert_eq!(session.cost_estimate().unwrap().amount, dec!(7.5));
        assert_eq!(session.clock(), "01:30");
    }

    #[test]
    fn test_hang_up_while_active_settles_with_server_figures() {
        let mut session = active();
        for _ in 0..90 {
            session.on_tick();
        }
        assert_eq!(
            session.hang_up(),
            Transition::Terminated(Some(EndCall {
                call_id: "c-1".to_string(),
                settle: true
            }))
        );
        assert_eq!(session.status(), CallStatus::Ended);
        assert_eq!(session.on_tick(), Transition::Ignored);
        assert_eq!(session.hang_up(), Transition::Ignored);

        let response = EndCallResponse {
            success: true,
            duration_seconds: Some(92),
            cost: Some(dec!(7.67)),
            listener_earned: None,
        };
        session.on_end_settled(Ok(response));

        let summary = session.outcome().and_then(CallOutcome::summary).unwrap();
        assert_eq!(summary.duration_seconds, 92);
        assert_eq!(summary.cost, dec!(7.67));
        assert!(!summary.estimated);
    }

    #[test]
    fn test_end_failure_aborts() {
        let mut session = active();
        session.hang_up();
        session.on_end_settled(Err(ClientError::Transport("timeout".into())));
        assert!(matches!(session.outcome(), Some(CallOutcome::EndFailed(_))));
    }

    #[test]
    fn test_hang_up_while_ringing_cancels() {
        let mut session = ringing();
        assert_eq!(
            session.hang_up(),
            Transition::Terminated(Some(EndCall {
                call_id: "c-1".to_string(),
                settle: false
            }))
        );
        assert_eq!(session.outcome(), Some(&CallOutcome::Cancelled));
    }

    #[test]
    fn test_hang_up_while_connecting_applies_after_start() {
        let mut session = CallSession::outgoing(CallType::Video, None);
        assert_eq!(session.hang_up(), Transition::Updated);
        assert_eq!(session.status(), CallStatus::Connecting);

        assert_eq!(
            session.on_started(&started("c-9")),
            Transition::Terminated(Some(EndCall {
                call_id: "c-9".to_string(),
                settle: false
            }))
        );
        assert_eq!(session.outcome(), Some(&CallOutcome::Cancelled));
    }

    #[test]
    fn test_toggles_only_while_active() {
        let mut session = ringing();
        assert_eq!(session.toggle_mute(), Transition::Ignored);

        let mut session = active();
        session.toggle_mute();
        session.toggle_speaker();
        assert!(session.is_muted());
        assert!(session.is_speaker());
        session.toggle_mute();
        assert!(!session.is_muted());
    }

    #[test]
    fn test_accepted_call_starts_active() {
        let offer = IncomingCallOffer {
            call_id: "c-7".to_string(),
            caller_name: "Ravi".to_string(),
            call_type: CallType::Voice,
        };
        let accepted = AcceptedCall::new(offer, &AcceptCallResponse::default());
        let session = CallSession::accepted(&accepted, dec!(5));
        assert!(session.is_active());
        assert_eq!(session.call_id(), Some("c-7"));
        assert_eq!(session.rate_per_min(), Some(dec!(5)));
        assert_eq!(session.peer_name(), Some("Ravi"));
    }

    #[test]
    fn test_tear_down_produces_no_end_call() {
        let mut session = active();
        assert_eq!(session.tear_down(), Transition::Terminated(None));
        assert_eq!(session.outcome(), Some(&CallOutcome::TornDown));
        assert_eq!(session.tear_down(), Transition::Ignored);
    }

    #[test]
    fn test_dots_cycle_while_waiting() {
        let mut session = ringing();
        for _ in 0..5 {
            session.on_dots();
        }
        assert_eq!(session.dots(), 1);

        let mut session = active();
        assert_eq!(session.on_dots(), Transition::Ignored);
    }
}
