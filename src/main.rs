//! VoiceMatch client runner
//!
//! Drives the client core against a live backend from the terminal:
//!
//! - `call <listener_id> [voice|video] [great|good|okay|bad]` - place a call,
//!   hang up with Ctrl-C, optionally rate it
//! - `listen` - go online, heartbeat, and surface incoming calls
//! - `kyc [<id_type> <id_image> <selfie_video>]` - show or drive KYC progress

use anyhow::{bail, Context, Result};
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use voicematch_api::{ApiClient, VoiceMatchApi};
use voicematch_core::config::AppConfig;
use voicematch_core::models::{CallType, IdType, Rating, StartCallRequest};
use voicematch_services::{
    set_online, CallOutcome, CallSessionController, CallSessionHandle, HeartbeatService,
    IncomingCallWatcher, KycStep, KycWizard, LogAlert, RatingEpilogue, SessionRegistry,
};

const USAGE: &str = "usage: voicematch <call <listener_id> [voice|video] [rating] | listen | kyc [<id_type> <id_image> <selfie_video>]>";

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "voicematch={},voicematch_api={},voicematch_services={},reqwest=warn",
            log_level, log_level, log_level
        ))
    });

    let json = env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!(
        "Starting VoiceMatch client v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = AppConfig::load().context("Failed to load configuration")?;
    let client = ApiClient::from_config(&config.api).context("Failed to build API client")?;
    if !client.has_token() {
        warn!("No auth token configured (VOICEMATCH__API__AUTH_TOKEN); requests will be anonymous");
    }
    let api: Arc<dyn VoiceMatchApi> = Arc::new(client);

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("call") => {
            let listener_id = args.get(1).context(USAGE)?;
            let call_type = match args.get(2) {
                Some(raw) => raw.parse::<CallType>().map_err(anyhow::Error::msg)?,
                None => CallType::default(),
            };
            let rating = args
                .get(3)
                .map(|raw| raw.parse::<Rating>().map_err(anyhow::Error::msg))
                .transpose()?;
            run_call(api, &config, listener_id, call_type, rating).await
        }
        Some("listen") => run_listener(api, &config).await,
        Some("kyc") => run_kyc(api, &config, &args[1..]).await,
        _ => bail!(USAGE),
    }
}

async fn run_call(
    api: Arc<dyn VoiceMatchApi>,
    config: &AppConfig,
    listener_id: &str,
    call_type: CallType,
    rating: Option<Rating>,
) -> Result<()> {
    let controller =
        CallSessionController::new(api.clone(), SessionRegistry::new(), config.calls.clone());
    let handle = controller.dial(StartCallRequest::new(listener_id, call_type), None);

    let outcome = follow_session(handle).await?;
    info!("{}", outcome.message());

    if let Some(mut epilogue) = RatingEpilogue::for_outcome(api, &outcome) {
        let summary = epilogue.summary();
        info!(
            "Call summary: duration={}, cost={}{}",
            epilogue.duration_label(),
            summary.cost,
            if summary.estimated { " (estimated)" } else { "" }
        );
        match rating {
            Some(rating) => epilogue.submit(rating, None).await?,
            None => epilogue.skip(),
        }
    }
    Ok(())
}

/// Log status changes until the session ends; Ctrl-C hangs up
async fn follow_session(handle: CallSessionHandle) -> Result<CallOutcome> {
    let mut updates = handle.subscribe();
    let mut last_status = None;
    let mut hung_up = false;

    loop {
        let session = updates.borrow_and_update().clone();
        if last_status != Some(session.status()) {
            info!("📞 {}", session.status());
            last_status = Some(session.status());
        }
        if let Some(outcome) = session.outcome() {
            return Ok(outcome.clone());
        }

        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c(), if !hung_up => {
                hung_up = true;
                handle.hang_up().await?;
            }
        }
    }

    let session = handle.wait().await;
    Ok(session.outcome().cloned().unwrap_or(CallOutcome::TornDown))
}

async fn run_listener(api: Arc<dyn VoiceMatchApi>, config: &AppConfig) -> Result<()> {
    set_online(api.as_ref(), true).await?;
    let heartbeat = HeartbeatService::spawn(api.clone(), config.listener.heartbeat_interval());
    let watcher = IncomingCallWatcher::spawn(api.clone(), Arc::new(LogAlert), &config.listener);
    let controller =
        CallSessionController::new(api.clone(), SessionRegistry::new(), config.calls.clone());
    let mut offers = watcher.subscribe();

    if !config.listener.auto_accept {
        info!("auto_accept is off; incoming calls are only announced");
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = offers.changed() => {
                if changed.is_err() {
                    break;
                }
                let offer = offers.borrow_and_update().clone();
                let Some(offer) = offer else { continue };
                if !config.listener.auto_accept {
                    continue;
                }

                match watcher.accept(&offer.call_id).await {
                    Ok(accepted) => {
                        let handle = controller.join(&accepted)?;
                        let outcome = follow_session(handle).await?;
                        info!("{}", outcome.message());
                    }
                    Err(e) => warn!("Could not accept call {}: {}", offer.call_id, e),
                }
            }
        }
    }

    watcher.teardown().await;
    heartbeat.stop().await;
    if let Err(e) = set_online(api.as_ref(), false).await {
        warn!("Failed to go offline: {}", e);
    }
    Ok(())
}

async fn run_kyc(api: Arc<dyn VoiceMatchApi>, config: &AppConfig, args: &[String]) -> Result<()> {
    let mut wizard = KycWizard::new(api, config.kyc.clone());
    let step = wizard.resume().await?;
    info!("KYC step: {}", step);

    let [id_type, id_image, selfie] = args else {
        if let Some(result) = wizard.state().result() {
            info!("KYC {}: {}", result.status.as_str(), result.message);
        }
        return Ok(());
    };

    let id_type: IdType = id_type.parse().map_err(anyhow::Error::msg)?;
    let id_image = tokio::fs::read(id_image)
        .await
        .with_context(|| format!("Failed to read {}", id_image))?;
    let selfie = tokio::fs::read(selfie)
        .await
        .with_context(|| format!("Failed to read {}", selfie))?;

    if step == KycStep::Start {
        wizard.begin()?;
    }
    if wizard.step() == KycStep::UploadId {
        wizard.attach_id_image(id_type, id_image)?;
        if wizard.submit_id().await? == KycStep::Result {
            if let Some(result) = wizard.state().result() {
                info!("KYC {}: {}", result.status.as_str(), result.message);
            }
            return Ok(());
        }
    }
    if wizard.step() == KycStep::ConfirmData {
        wizard.confirm_data().await?;
    }
    if wizard.step() == KycStep::Selfie {
        wizard.attach_selfie(selfie)?;
        let result = wizard.submit_selfie().await?;
        info!("KYC {}: {}", result.status.as_str(), result.message);
    }
    Ok(())
}
