//! Incoming-call watcher (listener side)
//!
//! Polls `calls/check-incoming` on a fixed cadence and exposes at most one
//! pending offer. A persisting offer alerts once; a competing offer is
//! ignored until the current one is accepted, rejected or withdrawn.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use voicematch_api::VoiceMatchApi;
use voicematch_core::config::ListenerConfig;
use voicematch_core::models::{AcceptedCall, IncomingCallOffer, IncomingCheck};
use voicematch_core::{ClientError, ClientResult};

const COMMAND_BUFFER: usize = 8;

/// An outstanding `calls/check-incoming` request
type IncomingPoll = Pin<Box<dyn Future<Output = ClientResult<IncomingCheck>> + Send>>;

/// Surface for ringing the listener's device
pub trait OfferAlert: Send + Sync {
    fn alert(&self, offer: &IncomingCallOffer);
}

/// Alert that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlert;

impl OfferAlert for LogAlert {
    fn alert(&self, offer: &IncomingCallOffer) {
        info!(
            "📳 Incoming {} call from {} (call_id={})",
            offer.call_type, offer.caller_name, offer.call_id
        );
    }
}

/// What a single poll meant for the pending offer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// New pending offer; alert once
    Arrived(IncomingCallOffer),
    /// Same offer as last time
    Unchanged,
    /// The pending offer is gone without a local decision
    Withdrawn(IncomingCallOffer),
    /// A different offer while one is pending; ignored
    Competing(String),
    Idle,
}

/// Pending-offer bookkeeping, independent of any timer
#[derive(Debug, Default)]
pub struct OfferTracker {
    current: Option<IncomingCallOffer>,
    /// Last offer decided locally; not re-offered while the backend still
    /// reports it
    resolved: Option<String>,
}

impl OfferTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, check: &IncomingCheck) -> Observation {
        let Some(offer) = check.offer() else {
            if check.has_incoming {
                warn!("Incoming check without a call id; ignoring");
                return Observation::Unchanged;
            }
            self.resolved = None;
            return match self.current.take() {
                Some(offer) => Observation::Withdrawn(offer),
                None => Observation::Idle,
            };
        };

        if self.resolved.as_deref() == Some(offer.call_id.as_str()) {
            return Observation::Idle;
        }

        if let Some(current) = &self.current {
            return if current.call_id == offer.call_id {
                Observation::Unchanged
            } else {
                Observation::Competing(offer.call_id)
            };
        }

        self.current = Some(offer.clone());
        Observation::Arrived(offer)
    }

    pub fn current(&self) -> Option<&IncomingCallOffer> {
        self.current.as_ref()
    }

    /// Pending offer with this id, if any
    pub fn pending(&self, call_id: &str) -> Option<&IncomingCallOffer> {
        self.current.as_ref().filter(|offer| offer.call_id == call_id)
    }

    /// Close the pending offer after a local accept or reject
    pub fn resolve(&mut self, call_id: &str) -> Option<IncomingCallOffer> {
        self.pending(call_id)?;
        self.resolved = Some(call_id.to_string());
        self.current.take()
    }
}

enum WatcherCommand {
    Accept {
        call_id: String,
        reply: oneshot::Sender<ClientResult<AcceptedCall>>,
    },
    Reject {
        call_id: String,
        reply: oneshot::Sender<ClientResult<()>>,
    },
}

/// Background poller for incoming calls
pub struct IncomingCallWatcher {
    api: Arc<dyn VoiceMatchApi>,
    alert: Arc<dyn OfferAlert>,
    tracker: OfferTracker,
    offers: watch::Sender<Option<IncomingCallOffer>>,
}

impl IncomingCallWatcher {
    /// Start polling; the first check runs immediately
    pub fn spawn(
        api: Arc<dyn VoiceMatchApi>,
        alert: Arc<dyn OfferAlert>,
        config: &ListenerConfig,
    ) -> IncomingCallHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (offers_tx, offers_rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        let watcher = Self {
            api,
            alert,
            tracker: OfferTracker::new(),
            offers: offers_tx,
        };
        let poll_every = config.incoming_poll_interval();
        info!("👂 Watching for incoming calls every {:?}", poll_every);
        let task = tokio::spawn(watcher.run(command_rx, cancel.clone(), poll_every));

        IncomingCallHandle {
            commands: command_tx,
            offers: offers_rx,
            cancel,
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<WatcherCommand>,
        cancel: CancellationToken,
        poll_every: Duration,
    ) {
        let mut poll = interval(poll_every.max(Duration::from_millis(1)));
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<IncomingPoll> = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                command = commands.recv() => {
                    // A local decision supersedes whatever the check would report
                    in_flight = None;
                    match command {
                        Some(WatcherCommand::Accept { call_id, reply }) => {
                            let result = self.accept(&call_id, &cancel).await;
                            let _ = reply.send(result);
                        }
                        Some(WatcherCommand::Reject { call_id, reply }) => {
                            let result = self.reject(&call_id, &cancel).await;
                            let _ = reply.send(result);
                        }
                        None => break,
                    }
                }
                result = next_check(&mut in_flight) => {
                    in_flight = None;
                    self.on_check(result);
                }
                _ = poll.tick(), if in_flight.is_none() => {
                    let api = Arc::clone(&self.api);
                    in_flight = Some(Box::pin(async move { api.check_incoming().await }));
                }
            }
        }
        debug!("Incoming-call watcher stopped");
    }

    fn on_check(&mut self, result: ClientResult<IncomingCheck>) {
        let check = match result {
            Ok(check) => check,
            Err(e) => {
                debug!("Incoming check failed: {}", e);
                return;
            }
        };

        match self.tracker.observe(&check) {
            Observation::Arrived(offer) => {
                self.alert.alert(&offer);
                self.publish();
            }
            Observation::Withdrawn(offer) => {
                info!("Incoming call {} withdrawn", offer.call_id);
                self.publish();
            }
            Observation::Competing(call_id) => {
                debug!("Ignoring competing offer {} while one is pending", call_id);
            }
            Observation::Unchanged | Observation::Idle => {}
        }
    }

    /// The offer stays pending until the backend confirms
    async fn accept(&mut self, call_id: &str, cancel: &CancellationToken) -> ClientResult<AcceptedCall> {
        let offer = self
            .tracker
            .pending(call_id)
            .cloned()
            .ok_or_else(|| ClientError::NoPendingOffer(call_id.to_string()))?;

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(ClientError::ControllerStopped),
            result = self.api.accept_call(call_id) => result,
        };

        match result {
            Ok(response) => {
                self.tracker.resolve(call_id);
                self.publish();
                info!("✅ Accepted call {} from {}", call_id, offer.caller_name);
                Ok(AcceptedCall::new(offer, &response))
            }
            Err(e) => {
                error!("❌ Failed to accept call {}: {}", call_id, e);
                Err(e)
            }
        }
    }

    /// Local state is cleared before the request; its failure is only logged
    async fn reject(&mut self, call_id: &str, cancel: &CancellationToken) -> ClientResult<()> {
        if self.tracker.resolve(call_id).is_none() {
            return Err(ClientError::NoPendingOffer(call_id.to_string()));
        }
        self.publish();

        let result = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            result = self.api.reject_call(call_id) => result,
        };
        match result {
            Ok(()) => info!("Rejected call {}", call_id),
            Err(e) => warn!("Reject for {} failed: {}", call_id, e),
        }
        Ok(())
    }

    fn publish(&self) {
        self.offers.send_replace(self.tracker.current().cloned());
    }
}

async fn next_check(poll: &mut Option<IncomingPoll>) -> ClientResult<IncomingCheck> {
    match poll {
        Some(poll) => poll.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Owner-side view of the watcher; dropping it stops polling
pub struct IncomingCallHandle {
    commands: mpsc::Sender<WatcherCommand>,
    offers: watch::Receiver<Option<IncomingCallOffer>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl IncomingCallHandle {
    pub fn current_offer(&self) -> Option<IncomingCallOffer> {
        self.offers.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<IncomingCallOffer>> {
        self.offers.clone()
    }

    /// Accept the pending offer; on failure it stays pending
    pub async fn accept(&self, call_id: &str) -> ClientResult<AcceptedCall> {
        let (reply, response) = oneshot::channel();
        self.send(WatcherCommand::Accept {
            call_id: call_id.to_string(),
            reply,
        })
        .await?;
        response.await.map_err(|_| ClientError::ControllerStopped)?
    }

    /// Reject the pending offer; always clears it locally
    pub async fn reject(&self, call_id: &str) -> ClientResult<()> {
        let (reply, response) = oneshot::channel();
        self.send(WatcherCommand::Reject {
            call_id: call_id.to_string(),
            reply,
        })
        .await?;
        response.await.map_err(|_| ClientError::ControllerStopped)?
    }

    pub async fn teardown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Incoming-call watcher failed: {}", e);
            }
        }
    }

    async fn send(&self, command: WatcherCommand) -> ClientResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::ControllerStopped)
    }
}

impl Drop for IncomingCallHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::time::{sleep, Instant};
    use voicematch_api::testing::{incoming, network_error, no_incoming, ApiCall, ScriptedApi};
    use voicematch_core::models::{AcceptCallResponse, CallType};

    #[derive(Default)]
    struct RecordingAlert {
        alerted: Mutex<Vec<String>>,
    }

    impl OfferAlert for RecordingAlert {
        fn alert(&self, offer: &IncomingCallOffer) {
            self.alerted.lock().push(offer.call_id.clone());
        }
    }

    fn spawn(api: &Arc<ScriptedApi>, alert: &Arc<RecordingAlert>) -> IncomingCallHandle {
        IncomingCallWatcher::spawn(api.clone(), alert.clone(), &ListenerConfig::default())
    }

    // ==================== OfferTracker ====================

    #[test]
    fn test_tracker_alerts_once_per_offer() {
        let mut tracker = OfferTracker::new();
        let check = incoming("c-1", "Ravi");

        assert!(matches!(tracker.observe(&check), Observation::Arrived(_)));
        assert_eq!(tracker.observe(&check), Observation::Unchanged);
        assert_eq!(tracker.current().unwrap().caller_name, "Ravi");
        assert_eq!(tracker.current().unwrap().call_type, CallType::Voice);
    }

    #[test]
    fn test_tracker_ignores_competing_offer() {
        let mut tracker = OfferTracker::new();
        tracker.observe(&incoming("c-1", "Ravi"));

        assert_eq!(
            tracker.observe(&incoming("c-2", "Asha")),
            Observation::Competing("c-2".to_string())
        );
        assert_eq!(tracker.current().unwrap().call_id, "c-1");
    }

    #[test]
    fn test_tracker_withdrawal() {
        let mut tracker = OfferTracker::new();
        tracker.observe(&incoming("c-1", "Ravi"));

        assert!(matches!(
            tracker.observe(&no_incoming()),
            Observation::Withdrawn(offer) if offer.call_id == "c-1"
        ));
        assert!(tracker.current().is_none());
        assert_eq!(tracker.observe(&no_incoming()), Observation::Idle);
    }

    #[test]
    fn test_tracker_does_not_reoffer_resolved_call() {
        let mut tracker = OfferTracker::new();
        tracker.observe(&incoming("c-1", "Ravi"));
        assert!(tracker.resolve("c-1").is_some());

        // Backend still reports it until its own state catches up
        assert_eq!(tracker.observe(&incoming("c-1", "Ravi")), Observation::Idle);
        assert!(matches!(
            tracker.observe(&incoming("c-2", "Asha")),
            Observation::Arrived(_)
        ));
    }

    #[test]
    fn test_tracker_resolve_requires_matching_offer() {
        let mut tracker = OfferTracker::new();
        assert!(tracker.resolve("c-1").is_none());

        tracker.observe(&incoming("c-1", "Ravi"));
        assert!(tracker.resolve("c-9").is_none());
        assert!(tracker.current().is_some());
    }

    // ==================== Watcher ====================

    #[tokio::test(start_paused = true)]
    async fn test_persisting_offer_alerts_once() {
        let api = Arc::new(ScriptedApi::new().with_idle_incoming(incoming("c-1", "Ravi")));
        let alert = Arc::new(RecordingAlert::default());
        let handle = spawn(&api, &alert);

        sleep(Duration::from_secs(10)).await;

        assert!(api.incoming_polls() >= 4);
        assert_eq!(*alert.alerted.lock(), vec!["c-1".to_string()]);
        assert_eq!(handle.current_offer().unwrap().call_id, "c-1");
        handle.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_withdrawn_offer_is_cleared() {
        let api = Arc::new(
            ScriptedApi::new().with_incoming(vec![Ok(incoming("c-1", "Ravi"))]),
        );
        let alert = Arc::new(RecordingAlert::default());
        let handle = spawn(&api, &alert);

        sleep(Duration::from_millis(100)).await;
        assert!(handle.current_offer().is_some());

        sleep(Duration::from_secs(3)).await;
        assert!(handle.current_offer().is_none());
        handle.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_are_ignored() {
        let api = Arc::new(ScriptedApi::new().with_incoming(vec![
            Err(network_error()),
            Ok(incoming("c-1", "Ravi")),
        ]));
        let alert = Arc::new(RecordingAlert::default());
        let handle = spawn(&api, &alert);

        sleep(Duration::from_millis(3_100)).await;
        assert_eq!(handle.current_offer().unwrap().call_id, "c-1");
        handle.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_returns_call_and_clears_offer() {
        let api = Arc::new(ScriptedApi::new().with_idle_incoming(incoming("c-1", "Ravi")));
        let alert = Arc::new(RecordingAlert::default());
        let handle = spawn(&api, &alert);
        sleep(Duration::from_millis(100)).await;

        let accepted = handle.accept("c-1").await.unwrap();
        assert_eq!(accepted.call_id(), "c-1");
        assert_eq!(accepted.offer.caller_name, "Ravi");
        assert_eq!(accepted.room.as_ref().unwrap().room_id, "room-c-1");
        assert!(handle.current_offer().is_none());

        // Still reported by the backend, but not offered again
        sleep(Duration::from_secs(10)).await;
        assert!(handle.current_offer().is_none());
        assert_eq!(alert.alerted.lock().len(), 1);
        handle.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_accept_keeps_offer() {
        let api = Arc::new(
            ScriptedApi::new()
                .with_idle_incoming(incoming("c-1", "Ravi"))
                .with_accepts(vec![Err(ClientError::api(
                    409,
                    Some("Call no longer available".to_string()),
                ))]),
        );
        let alert = Arc::new(RecordingAlert::default());
        let handle = spawn(&api, &alert);
        sleep(Duration::from_millis(100)).await;

        let err = handle.accept("c-1").await.unwrap_err();
        assert_eq!(err.to_string(), "Call no longer available");
        assert_eq!(handle.current_offer().unwrap().call_id, "c-1");

        // Retrying succeeds with the default scripted answer
        assert!(handle.accept("c-1").await.is_ok());
        handle.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_in_flight_is_not_replaced() {
        let api = Arc::new(
            ScriptedApi::new()
                .with_incoming(vec![Ok(incoming("c-1", "Ravi"))])
                .with_idle_incoming(incoming("c-2", "Asha"))
                .with_accept_delay(Duration::from_secs(10))
                .with_accepts(vec![Ok(AcceptCallResponse {
                    success: true,
                    hms_token: None,
                    hms_room_id: None,
                    rate_per_min: None,
                })]),
        );
        let alert = Arc::new(RecordingAlert::default());
        let handle = spawn(&api, &alert);
        sleep(Duration::from_millis(100)).await;

        let accepted = handle.accept("c-1").await.unwrap();
        assert_eq!(accepted.call_id(), "c-1");
        assert!(accepted.room.is_none());

        // The competing offer only surfaces once c-1 is resolved
        sleep(Duration::from_secs(4)).await;
        assert_eq!(handle.current_offer().unwrap().call_id, "c-2");
        assert_eq!(
            *alert.alerted.lock(),
            vec!["c-1".to_string(), "c-2".to_string()]
        );
        handle.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_is_not_held_up_by_slow_check() {
        let api = Arc::new(
            ScriptedApi::new()
                .with_idle_incoming(incoming("c-1", "Ravi"))
                .with_incoming_delay(Duration::from_secs(30)),
        );
        let alert = Arc::new(RecordingAlert::default());
        let handle = spawn(&api, &alert);

        // First answer lands at t=30s; the next check is already outstanding
        sleep(Duration::from_secs(31)).await;
        assert_eq!(handle.current_offer().unwrap().call_id, "c-1");
        assert_eq!(api.incoming_polls(), 2);

        let started = Instant::now();
        let accepted = handle.accept("c-1").await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(accepted.call_id(), "c-1");

        sleep(Duration::from_secs(60)).await;
        assert!(handle.current_offer().is_none());
        assert_eq!(alert.alerted.lock().len(), 1);
        handle.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reject_is_not_held_up_by_slow_check() {
        let api = Arc::new(
            ScriptedApi::new()
                .with_idle_incoming(incoming("c-1", "Ravi"))
                .with_incoming_delay(Duration::from_secs(30)),
        );
        let alert = Arc::new(RecordingAlert::default());
        let handle = spawn(&api, &alert);
        sleep(Duration::from_secs(31)).await;

        let started = Instant::now();
        assert!(handle.reject("c-1").await.is_ok());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(handle.current_offer().is_none());
        handle.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_accept_unknown_offer_fails() {
        let api = Arc::new(ScriptedApi::new());
        let alert = Arc::new(RecordingAlert::default());
        let handle = spawn(&api, &alert);

        let err = handle.accept("c-404").await.unwrap_err();
        assert_eq!(err, ClientError::NoPendingOffer("c-404".to_string()));
        assert_eq!(api.count(|call| matches!(call, ApiCall::AcceptCall(_))), 0);
        handle.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reject_clears_even_when_request_fails() {
        let api = Arc::new(
            ScriptedApi::new()
                .with_idle_incoming(incoming("c-1", "Ravi"))
                .with_reject(Err(network_error())),
        );
        let alert = Arc::new(RecordingAlert::default());
        let handle = spawn(&api, &alert);
        sleep(Duration::from_millis(100)).await;

        assert!(handle.reject("c-1").await.is_ok());
        assert!(handle.current_offer().is_none());
        assert!(api.calls().contains(&ApiCall::RejectCall("c-1".to_string())));
        handle.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_stops_polling() {
        let api = Arc::new(ScriptedApi::new());
        let alert = Arc::new(RecordingAlert::default());
        let handle = spawn(&api, &alert);
        sleep(Duration::from_secs(7)).await;

        handle.teardown().await;
        let polls = api.incoming_polls();
        sleep(Duration::from_secs(30)).await;
        assert_eq!(api.incoming_polls(), polls);
    }
}
