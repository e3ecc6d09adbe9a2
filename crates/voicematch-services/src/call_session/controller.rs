//! Call session controller
//!
//! Each session runs as one tokio task. Status polls, the ringing watchdog,
//! the billing ticker and user commands all arrive through a single
//! `select!` loop, so `CallSession` sees one event at a time and the first
//! terminal transition wins.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use voicematch_api::VoiceMatchApi;
use voicematch_core::config::CallConfig;
use voicematch_core::models::{AcceptedCall, CallStatusResponse, StartCallRequest};
use voicematch_core::{ClientError, ClientResult};

use super::state::{CallSession, EndCall, Transition};
use crate::registry::{SessionClaim, SessionRegistry};

const COMMAND_BUFFER: usize = 16;

/// An outstanding `calls/status` request
type StatusPoll = Pin<Box<dyn Future<Output = ClientResult<CallStatusResponse>> + Send>>;

/// User input forwarded to a running session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallCommand {
    HangUp,
    ToggleMute,
    ToggleSpeaker,
}

/// Spawns call sessions against one backend
pub struct CallSessionController {
    api: Arc<dyn VoiceMatchApi>,
    registry: SessionRegistry,
    config: CallConfig,
}

impl CallSessionController {
    pub fn new(api: Arc<dyn VoiceMatchApi>, registry: SessionRegistry, config: CallConfig) -> Self {
        Self {
            api,
            registry,
            config,
        }
    }

    /// Start an outgoing call
    ///
    /// Returns immediately; the session begins in `Connecting` and the
    /// `calls/start` request runs inside the session task.
    pub fn dial(&self, request: StartCallRequest, listener_name: Option<String>) -> CallSessionHandle {
        info!(
            "📞 Dialing listener {} ({} call)",
            request.listener_id, request.call_type
        );
        let session = CallSession::outgoing(request.call_type, listener_name);
        self.spawn(session, None, Some(request))
    }

    /// Join a call accepted through the incoming-call watcher
    ///
    /// The session starts `Active` with billing running. Fails with
    /// `SessionInUse` if another session already owns the call id.
    pub fn join(&self, accepted: &AcceptedCall) -> ClientResult<CallSessionHandle> {
        let claim = self.registry.claim(accepted.call_id())?;
        info!(
            "✅ Joining call {} from {}",
            accepted.call_id(),
            accepted.offer.caller_name
        );
        let session = CallSession::accepted(accepted, self.config.default_rate());
        Ok(self.spawn(session, Some(claim), None))
    }

    fn spawn(
        &self,
        session: CallSession,
        claim: Option<SessionClaim>,
        start: Option<StartCallRequest>,
    ) -> CallSessionHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (updates_tx, updates_rx) = watch::channel(session.clone());
        let cancel = CancellationToken::new();

        let task = SessionTask {
            api: Arc::clone(&self.api),
            registry: self.registry.clone(),
            config: self.config.clone(),
            session,
            updates: updates_tx,
            claim,
        };
        let handle = tokio::spawn(task.run(command_rx, cancel.clone(), start));

        CallSessionHandle {
            commands: command_tx,
            updates: updates_rx,
            cancel,
            task: Some(handle),
        }
    }
}

/// Owner-side view of a running session
///
/// Dropping the handle tears the session down.
pub struct CallSessionHandle {
    commands: mpsc::Sender<CallCommand>,
    updates: watch::Receiver<CallSession>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CallSessionHandle {
    /// Latest published session state
    pub fn snapshot(&self) -> CallSession {
        self.updates.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CallSession> {
        self.updates.clone()
    }

    pub async fn hang_up(&self) -> ClientResult<()> {
        self.send(CallCommand::HangUp).await
    }

    pub async fn toggle_mute(&self) -> ClientResult<()> {
        self.send(CallCommand::ToggleMute).await
    }

    pub async fn toggle_speaker(&self) -> ClientResult<()> {
        self.send(CallCommand::ToggleSpeaker).await
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the session to end on its own
    pub async fn wait(mut self) -> CallSession {
        self.join().await
    }

    /// Stop every timer and abandon the session without further requests
    pub async fn teardown(mut self) -> CallSession {
        self.cancel.cancel();
        self.join().await
    }

    async fn send(&self, command: CallCommand) -> ClientResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ClientError::ControllerStopped)
    }

    async fn join(&mut self) -> CallSession {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Call session task failed: {}", e);
            }
        }
        self.snapshot()
    }
}

impl Drop for CallSessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct SessionTask {
    api: Arc<dyn VoiceMatchApi>,
    registry: SessionRegistry,
    config: CallConfig,
    session: CallSession,
    updates: watch::Sender<CallSession>,
    claim: Option<SessionClaim>,
}

impl SessionTask {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<CallCommand>,
        cancel: CancellationToken,
        start: Option<StartCallRequest>,
    ) {
        if let Some(request) = start {
            if !self.connect(request, &mut commands, &cancel).await {
                return;
            }
        }
        self.drive(&mut commands, &cancel).await;
    }

    /// `Connecting` phase; returns false if the session already ended
    async fn connect(
        &mut self,
        request: StartCallRequest,
        commands: &mut mpsc::Receiver<CallCommand>,
        cancel: &CancellationToken,
    ) -> bool {
        let api = Arc::clone(&self.api);
        let start = async move { api.start_call(&request).await };
        tokio::pin!(start);
        let mut dots = ticker(self.config.dots_interval(), MissedTickBehavior::Skip);

        let result = loop {
            let transition = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.tear_down();
                    return false;
                }
                command = commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => {
                        self.tear_down();
                        return false;
                    }
                },
                result = &mut start => break result,
                _ = dots.tick() => self.session.on_dots(),
            };
            if transition != Transition::Ignored {
                self.publish();
            }
        };

        let transition = match result {
            Ok(response) => match self.registry.claim(&response.call.id) {
                Ok(claim) => {
                    self.claim = Some(claim);
                    self.session.on_started(&response.call)
                }
                Err(e) => self.session.on_start_failed(&e),
            },
            Err(e) => {
                warn!("❌ Call start failed: {}", e);
                self.session.on_start_failed(&e)
            }
        };
        self.publish();

        match transition {
            Transition::Terminated(end) => {
                self.finish(end, cancel).await;
                false
            }
            _ => true,
        }
    }

    /// `Ringing` and `Active` phases
    async fn drive(&mut self, commands: &mut mpsc::Receiver<CallCommand>, cancel: &CancellationToken) {
        let mut poll = ticker(self.config.status_poll_interval(), MissedTickBehavior::Skip);
        let mut dots = ticker(self.config.dots_interval(), MissedTickBehavior::Skip);
        let watchdog = sleep(self.config.ringing_timeout());
        tokio::pin!(watchdog);

        let mut billing = self
            .session
            .is_active()
            .then(|| ticker(self.config.billing_tick(), MissedTickBehavior::Burst));
        // At most one status request is outstanding; it never blocks the loop
        let mut in_flight: Option<StatusPoll> = None;

        loop {
            let ringing = self.session.is_ringing();

            let transition = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.tear_down();
                    return;
                }
                command = commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => {
                        self.tear_down();
                        return;
                    }
                },
                _ = &mut watchdog, if ringing => {
                    warn!("⏱️ No answer within {:?}", self.config.ringing_timeout());
                    self.session.on_watchdog()
                }
                result = next_status(&mut in_flight), if ringing => {
                    in_flight = None;
                    self.on_status(result)
                }
                _ = poll.tick(), if ringing && in_flight.is_none() => {
                    in_flight = self.status_request();
                    Transition::Ignored
                }
                _ = next_tick(&mut billing) => self.session.on_tick(),
                _ = dots.tick(), if ringing => self.session.on_dots(),
            };

            match transition {
                Transition::Ignored => {}
                Transition::Updated => self.publish(),
                Transition::Activated => {
                    info!(
                        "✅ Call {} connected",
                        self.session.call_id().unwrap_or_default()
                    );
                    billing = Some(ticker(self.config.billing_tick(), MissedTickBehavior::Burst));
                    self.publish();
                }
                Transition::Terminated(end) => {
                    drop(in_flight.take());
                    self.publish();
                    self.finish(end, cancel).await;
                    return;
                }
            }

            if !self.session.is_ringing() {
                in_flight = None;
            }
        }
    }

    fn apply(&mut self, command: CallCommand) -> Transition {
        match command {
            CallCommand::HangUp => {
                info!("Hang-up requested ({})", self.session.status());
                self.session.hang_up()
            }
            CallCommand::ToggleMute => self.session.toggle_mute(),
            CallCommand::ToggleSpeaker => self.session.toggle_speaker(),
        }
    }

    fn status_request(&self) -> Option<StatusPoll> {
        let call_id = self.session.call_id()?.to_owned();
        let api = Arc::clone(&self.api);
        Some(Box::pin(async move { api.call_status(&call_id).await }))
    }

    fn on_status(&mut self, result: ClientResult<CallStatusResponse>) -> Transition {
        match result {
            Ok(response) => self.session.on_remote_status(response.status),
            Err(e) => {
                // Transient; the next tick retries
                debug!(
                    "Status poll for {} failed: {}",
                    self.session.call_id().unwrap_or("-"),
                    e
                );
                Transition::Ignored
            }
        }
    }

    /// Issue the end-call (if any) and release the session
    async fn finish(&mut self, end: Option<EndCall>, cancel: &CancellationToken) {
        if let Some(end) = end {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    self.tear_down();
                    return;
                }
                result = self.api.end_call(&end.call_id) => result,
            };

            if end.settle {
                if let Err(e) = &result {
                    error!("❌ Failed to end call {}: {}", end.call_id, e);
                }
                self.session.on_end_settled(result);
                self.publish();
            } else if let Err(e) = result {
                debug!("Best-effort end for {} failed: {}", end.call_id, e);
            }
        }

        if let Some(outcome) = self.session.outcome() {
            info!(
                "🛑 Call session finished: call_id={}, outcome={:?}",
                self.session.call_id().unwrap_or("-"),
                outcome
            );
        }
        self.claim = None;
    }

    fn tear_down(&mut self) {
        if self.session.tear_down() != Transition::Ignored {
            info!(
                "Call session torn down: call_id={}",
                self.session.call_id().unwrap_or("-")
            );
            self.publish();
        }
        self.claim = None;
    }

    fn publish(&self) {
        self.updates.send_replace(self.session.clone());
    }
}

/// Interval whose first tick fires one period from now
fn ticker(period: Duration, behavior: MissedTickBehavior) -> Interval {
    let period = period.max(Duration::from_millis(1));
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(behavior);
    interval
}

async fn next_status(poll: &mut Option<StatusPoll>) -> ClientResult<CallStatusResponse> {
    match poll {
        Some(poll) => poll.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(interval: &mut Option<Interval>) -> Instant {
    match interval {
        Some(interval) => interval.tick().await,
        None => std::future::pending().await,
    }
}
