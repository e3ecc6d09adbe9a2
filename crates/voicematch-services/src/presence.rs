//! Listener presence
//!
//! A heartbeat goes out on a fixed interval and whenever the app returns to
//! the foreground. Heartbeat failures are never surfaced.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use voicematch_api::VoiceMatchApi;
use voicematch_core::ClientResult;

pub struct HeartbeatService {
    foreground: Arc<Notify>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatService {
    /// Start heartbeating; the first beat is sent immediately
    pub fn spawn(api: Arc<dyn VoiceMatchApi>, every: Duration) -> Self {
        let foreground = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(Self::run(
            api,
            every.max(Duration::from_millis(1)),
            Arc::clone(&foreground),
            cancel.clone(),
        ));

        Self {
            foreground,
            cancel,
            task: Some(task),
        }
    }

    /// Send an extra heartbeat now
    pub fn app_foregrounded(&self) {
        self.foreground.notify_one();
    }

    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Heartbeat task failed: {}", e);
            }
        }
    }

    async fn run(
        api: Arc<dyn VoiceMatchApi>,
        every: Duration,
        foreground: Arc<Notify>,
        cancel: CancellationToken,
    ) {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = foreground.notified() => {}
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = api.heartbeat() => result,
            };
            if let Err(e) = result {
                debug!("Heartbeat failed: {}", e);
            }
        }
        debug!("Heartbeat stopped");
    }
}

impl Drop for HeartbeatService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Toggle listener availability; returns the state the backend settled on
#[instrument(skip(api))]
pub async fn set_online(api: &dyn VoiceMatchApi, online: bool) -> ClientResult<bool> {
    let response = api.set_online(online).await?;
    info!(
        "Listener is now {}",
        if response.online { "online" } else { "offline" }
    );
    Ok(response.online)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;
    use voicematch_api::testing::{network_error, ApiCall, ScriptedApi};

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_on_interval() {
        let api = Arc::new(ScriptedApi::new());
        let service = HeartbeatService::spawn(api.clone(), Duration::from_secs(30));

        sleep(Duration::from_secs(95)).await;
        // t = 0, 30, 60, 90
        assert_eq!(api.heartbeats(), 4);
        service.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_sends_extra_heartbeat() {
        let api = Arc::new(ScriptedApi::new());
        let service = HeartbeatService::spawn(api.clone(), Duration::from_secs(30));
        sleep(Duration::from_secs(5)).await;
        assert_eq!(api.heartbeats(), 1);

        service.app_foregrounded();
        sleep(Duration::from_secs(1)).await;
        assert_eq!(api.heartbeats(), 2);
        service.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_errors_are_ignored() {
        let api = Arc::new(ScriptedApi::new().with_heartbeat(Err(network_error())));
        let service = HeartbeatService::spawn(api.clone(), Duration::from_secs(30));

        sleep(Duration::from_secs(65)).await;
        assert_eq!(api.heartbeats(), 3);
        service.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_heartbeats() {
        let api = Arc::new(ScriptedApi::new());
        let service = HeartbeatService::spawn(api.clone(), Duration::from_secs(30));
        sleep(Duration::from_secs(1)).await;
        service.stop().await;

        sleep(Duration::from_secs(120)).await;
        assert_eq!(api.heartbeats(), 1);
    }

    #[tokio::test]
    async fn test_set_online() {
        let api = ScriptedApi::new();
        assert!(set_online(&api, true).await.unwrap());
        assert!(!set_online(&api, false).await.unwrap());
        assert_eq!(
            api.calls(),
            vec![ApiCall::SetOnline(true), ApiCall::SetOnline(false)]
        );
    }
}
