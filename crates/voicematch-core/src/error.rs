//! Unified error handling for the VoiceMatch client
//!
//! Every failure a controller can observe is expressed as a `ClientError`.
//! Domain-terminal outcomes (a rejected call, an underage KYC result) are
//! not errors; they are states of the respective state machines.

use thiserror::Error;

/// Fallback message when a failed response carries no usable `detail`
pub const DEFAULT_FAILURE_DETAIL: &str = "Request failed";

/// Main client error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    // ==================== API Errors ====================
    /// Non-success HTTP response; `detail` is the backend's message
    #[error("{detail}")]
    Api { status: u16, detail: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    // ==================== Session Errors ====================
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Call {0} is already owned by another session")]
    SessionInUse(String),

    #[error("No pending offer for call {0}")]
    NoPendingOffer(String),

    #[error("Controller has stopped")]
    ControllerStopped,

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    // ==================== Internal Errors ====================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    /// Builds an API error from a status code and an optional backend detail
    pub fn api(status: u16, detail: Option<String>) -> Self {
        ClientError::Api {
            status,
            detail: detail
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FAILURE_DETAIL.to_string()),
        }
    }

    /// True for failures of the request itself rather than a backend answer
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Decode(_))
    }

    /// HTTP status of an API failure, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns a stable code for logs and UI mapping
    pub fn error_code(&self) -> &'static str {
        match self {
            ClientError::Api { .. } => "api_error",
            ClientError::Transport(_) => "transport_error",
            ClientError::Decode(_) => "decode_error",
            ClientError::InvalidTransition(_) => "invalid_transition",
            ClientError::SessionInUse(_) => "session_in_use",
            ClientError::NoPendingOffer(_) => "no_pending_offer",
            ClientError::ControllerStopped => "controller_stopped",
            ClientError::Validation(_) => "validation_error",
            ClientError::MissingField(_) => "missing_field",
            ClientError::Config(_) => "config_error",
            ClientError::Serialization(_) => "serialization_error",
        }
    }
}

// ==================== From implementations ====================

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for ClientError {
    fn from(err: config::ConfigError) -> Self {
        ClientError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ClientError {
    fn from(err: validator::ValidationErrors) -> Self {
        ClientError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_uses_detail_as_message() {
        let err = ClientError::api(400, Some("Insufficient balance".to_string()));
        assert_eq!(err.to_string(), "Insufficient balance");
        assert_eq!(err.status(), Some(400));
    }

    #[test]
    fn test_api_error_defaults_detail() {
        assert_eq!(ClientError::api(500, None).to_string(), "Request failed");
        assert_eq!(
            ClientError::api(502, Some("  ".to_string())).to_string(),
            "Request failed"
        );
    }

    #[test]
    fn test_transport_classification() {
        assert!(ClientError::Transport("reset".to_string()).is_transport());
        assert!(ClientError::Decode("eof".to_string()).is_transport());
        assert!(!ClientError::api(404, None).is_transport());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ClientError::SessionInUse("c1".to_string()).error_code(),
            "session_in_use"
        );
        assert_eq!(ClientError::ControllerStopped.error_code(), "controller_stopped");
    }
}
