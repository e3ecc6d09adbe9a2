//! Application configuration
//!
//! Configuration is layered with the `config` crate: built-in defaults,
//! then optional `config/default` and `config/{RUN_MODE}` files, then
//! `VOICEMATCH__*` environment variables.

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub calls: CallConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub kyc: KycConfig,
}

/// Backend connection configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Backend origin, without the `/api` prefix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token obtained from the OTP login flow
    pub auth_token: Option<String>,

    /// Per-request timeout. Unset means the HTTP client default.
    pub request_timeout_secs: Option<u64>,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Caller-side call session timing
#[derive(Debug, Deserialize, Clone)]
pub struct CallConfig {
    /// Interval between `calls/status` polls while ringing
    #[serde(default = "default_status_poll_interval")]
    pub status_poll_interval_ms: u64,

    /// Ringing watchdog; the only domain-level timeout
    #[serde(default = "default_ringing_timeout")]
    pub ringing_timeout_secs: u64,

    /// Billing ticker period
    #[serde(default = "default_billing_tick")]
    pub billing_tick_ms: u64,

    /// Connecting-dots animation period
    #[serde(default = "default_dots_interval")]
    pub dots_interval_ms: u64,

    /// Rate used when the backend does not report one (accepted calls)
    #[serde(default = "default_rate_per_min")]
    pub default_rate_per_min: f64,
}

fn default_status_poll_interval() -> u64 {
    2000
}

fn default_ringing_timeout() -> u64 {
    60
}

fn default_billing_tick() -> u64 {
    1000
}

fn default_dots_interval() -> u64 {
    500
}

fn default_rate_per_min() -> f64 {
    5.0
}

impl CallConfig {
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    pub fn ringing_timeout(&self) -> Duration {
        Duration::from_secs(self.ringing_timeout_secs)
    }

    pub fn billing_tick(&self) -> Duration {
        Duration::from_millis(self.billing_tick_ms)
    }

    pub fn dots_interval(&self) -> Duration {
        Duration::from_millis(self.dots_interval_ms)
    }

    /// Fallback rate as money; an unusable value bills at the built-in rate
    pub fn default_rate(&self) -> Decimal {
        match Self::rate_from(self.default_rate_per_min) {
            Some(rate) => rate,
            None => {
                warn!(
                    "Invalid calls.default_rate_per_min {}; using {}",
                    self.default_rate_per_min,
                    default_rate_per_min()
                );
                Decimal::from(5)
            }
        }
    }

    fn rate_from(value: f64) -> Option<Decimal> {
        Decimal::try_from(value)
            .ok()
            .filter(|rate| !rate.is_sign_negative())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if Self::rate_from(self.default_rate_per_min).is_none() {
            return Err(ConfigError::Message(format!(
                "calls.default_rate_per_min must be a non-negative number, got {}",
                self.default_rate_per_min
            )));
        }
        Ok(())
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            status_poll_interval_ms: default_status_poll_interval(),
            ringing_timeout_secs: default_ringing_timeout(),
            billing_tick_ms: default_billing_tick(),
            dots_interval_ms: default_dots_interval(),
            default_rate_per_min: default_rate_per_min(),
        }
    }
}

/// Listener-side polling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ListenerConfig {
    /// Interval between `calls/check-incoming` polls
    #[serde(default = "default_incoming_poll_interval")]
    pub incoming_poll_interval_ms: u64,

    /// Interval between presence heartbeats
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Accept offers without a prompt (unattended agent mode)
    #[serde(default)]
    pub auto_accept: bool,
}

fn default_incoming_poll_interval() -> u64 {
    3000
}

fn default_heartbeat_interval() -> u64 {
    30
}

impl ListenerConfig {
    pub fn incoming_poll_interval(&self) -> Duration {
        Duration::from_millis(self.incoming_poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            incoming_poll_interval_ms: default_incoming_poll_interval(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            auto_accept: false,
        }
    }
}

/// KYC wizard configuration
#[derive(Debug, Deserialize, Clone)]
pub struct KycConfig {
    /// Minimum time the processing screen is shown
    #[serde(default = "default_processing_dwell")]
    pub processing_dwell_ms: u64,
}

fn default_processing_dwell() -> u64 {
    3000
}

impl KycConfig {
    pub fn processing_dwell(&self) -> Duration {
        Duration::from_millis(self.processing_dwell_ms)
    }
}

impl Default for KycConfig {
    fn default() -> Self {
        Self {
            processing_dwell_ms: default_processing_dwell(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config files
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("api.base_url", default_base_url())?
            .set_default("calls.status_poll_interval_ms", 2000)?
            .set_default("calls.ringing_timeout_secs", 60)?
            .set_default("calls.billing_tick_ms", 1000)?
            .set_default("calls.dots_interval_ms", 500)?
            .set_default("calls.default_rate_per_min", 5.0)?
            .set_default("listener.incoming_poll_interval_ms", 3000)?
            .set_default("listener.heartbeat_interval_secs", 30)?
            .set_default("listener.auto_accept", false)?
            .set_default("kyc.processing_dwell_ms", 3000)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with VOICEMATCH_ prefix
            .add_source(
                Environment::with_prefix("VOICEMATCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: Self = config.try_deserialize()?;
        app.calls.validate()?;
        debug!(
            "Configuration loaded: run_mode={}, base_url={}",
            run_mode, app.api.base_url
        );
        Ok(app)
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("VOICEMATCH").separator("__"))
            .build()?;

        let app: Self = config.try_deserialize()?;
        app.calls.validate()?;
        Ok(app)
    }

    /// Configuration pointing at a given backend with every other default
    pub fn for_base_url(base_url: &str) -> Self {
        Self {
            api: ApiConfig {
                base_url: base_url.to_string(),
                auth_token: None,
                request_timeout_secs: None,
            },
            calls: CallConfig::default(),
            listener: ListenerConfig::default(),
            kyc: KycConfig::default(),
        }
    }
}
