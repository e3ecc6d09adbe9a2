//! Authenticated HTTP client for the VoiceMatch backend
//!
//! Low-level `get`/`post` over JSON. Every request carries the bearer token
//! (when set) and a fresh `X-Request-Id`.

use parking_lot::RwLock;
use reqwest::{Client, ClientBuilder, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use voicematch_core::config::ApiConfig;
use voicematch_core::error::DEFAULT_FAILURE_DETAIL;
use voicematch_core::{ClientError, ClientResult};

/// Path prefix shared by every backend route
const API_PREFIX: &str = "/api";

/// Client for the VoiceMatch REST API
pub struct ApiClient {
    http_client: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    /// Creates a new API client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Backend origin (ej: "https://api.voicematch.app")
    /// * `timeout` - Per-request timeout; `None` keeps the reqwest default
    pub fn new(base_url: &str, timeout: Option<Duration>) -> ClientResult<Self> {
        let mut builder = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60));

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let http_client = builder
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    /// Creates a client from the `api` configuration section
    pub fn from_config(config: &ApiConfig) -> ClientResult<Self> {
        let client = Self::new(&config.base_url, config.request_timeout())?;
        if let Some(token) = config.auth_token.as_deref().filter(|t| !t.is_empty()) {
            client.set_token(token);
        }
        Ok(client)
    }

    pub fn set_token(&self, token: &str) {
        *self.token.write() = Some(token.to_string());
    }

    pub fn clear_token(&self) {
        *self.token.write() = None;
    }

    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    /// Full URL for a route such as `/calls/start`
    pub fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    /// `GET {base}/api{path}`
    #[instrument(skip_all, fields(path = %path))]
    pub async fn get<R>(&self, path: &str) -> ClientResult<R>
    where
        R: DeserializeOwned,
    {
        let request = self.http_client.get(self.url(path));
        self.execute(request).await
    }

    /// `POST {base}/api{path}` with an optional JSON body
    #[instrument(skip_all, fields(path = %path))]
    pub async fn post<B, R>(&self, path: &str, body: Option<&B>) -> ClientResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self.http_client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        self.execute(request).await
    }

    async fn execute<R>(&self, request: RequestBuilder) -> ClientResult<R>
    where
        R: DeserializeOwned,
    {
        let request_id = Uuid::new_v4();
        let mut request = request.header("X-Request-Id", request_id.to_string());
        let token = self.token.read().clone();
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            warn!(
                "API error: status={}, request_id={}",
                status.as_u16(),
                request_id
            );
            return Err(ClientError::api(status.as_u16(), extract_detail(&body)));
        }

        debug!("API response: request_id={}, bytes={}", request_id, body.len());

        parse_body(&body)
    }
}

/// Decodes a success body; an empty body is read as JSON `null`
fn parse_body<R: DeserializeOwned>(body: &str) -> ClientResult<R> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body)
        .map_err(|e| ClientError::Decode(format!("Failed to parse JSON: {} - Body: {}", e, body)))
}

/// Pulls the human-readable `detail` out of an error body
///
/// A structured detail (validation errors) is returned as its JSON text.
fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(detail) => Some(detail.clone()),
        serde_json::Value::Null => Some(DEFAULT_FAILURE_DETAIL.to_string()),
        other => Some(other.to_string()),
    }
}
