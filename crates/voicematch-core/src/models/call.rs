//! Call models
//!
//! Wire types for the `/calls/*` endpoints and the client-side values that
//! flow between the incoming-call watcher, the call session controller and
//! the post-call epilogue.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// Media type of a call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    #[default]
    Voice,
    Video,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::Voice => "voice",
            CallType::Video => "video",
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "voice" => Ok(CallType::Voice),
            "video" => Ok(CallType::Video),
            other => Err(format!("unknown call type: {}", other)),
        }
    }
}

/// Real-time room credentials returned by start/accept
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCredentials {
    pub room_id: String,
    pub token: Option<String>,
}

impl RoomCredentials {
    fn from_parts(room_id: Option<&String>, token: Option<&String>) -> Option<Self> {
        room_id.map(|room_id| RoomCredentials {
            room_id: room_id.clone(),
            token: token.cloned(),
        })
    }
}

// ==================== Start / status / end ====================

#[derive(Debug, Clone, Serialize, Validate)]
pub struct StartCallRequest {
    #[validate(length(min = 1, message = "listener_id is required"))]
    pub listener_id: String,
    pub call_type: CallType,
}

impl StartCallRequest {
    pub fn new(listener_id: impl Into<String>, call_type: CallType) -> Self {
        Self {
            listener_id: listener_id.into(),
            call_type,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartCallResponse {
    #[serde(default)]
    pub success: bool,
    pub call: StartedCall,
}

/// Call record returned by `calls/start`
#[derive(Debug, Clone, Deserialize)]
pub struct StartedCall {
    pub id: String,
    pub rate_per_min: Decimal,
    #[serde(default)]
    pub is_first_call: bool,
    #[serde(default)]
    pub hms_room_id: Option<String>,
    #[serde(default)]
    pub hms_token: Option<String>,
}

impl StartedCall {
    pub fn room(&self) -> Option<RoomCredentials> {
        RoomCredentials::from_parts(self.hms_room_id.as_ref(), self.hms_token.as_ref())
    }
}

/// Status of a call as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteCallStatus {
    Active,
    Rejected,
    Missed,
    Ended,
    /// Anything else (`ringing`, `pending`, ...) means no decision yet
    #[serde(other)]
    Pending,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallStatusResponse {
    pub status: RemoteCallStatus,
}

/// Body shared by end/accept/reject
#[derive(Debug, Clone, Serialize)]
pub struct CallIdRequest {
    pub call_id: String,
}

impl CallIdRequest {
    pub fn new(call_id: &str) -> Self {
        Self {
            call_id: call_id.to_string(),
        }
    }
}

/// Authoritative settlement returned by `calls/end`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndCallResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub cost: Option<Decimal>,
    #[serde(default)]
    pub listener_earned: Option<Decimal>,
}

// ==================== Incoming calls ====================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IncomingCheck {
    #[serde(default)]
    pub has_incoming: bool,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub caller_name: Option<String>,
    #[serde(default)]
    pub call_type: Option<CallType>,
}

impl IncomingCheck {
    /// The offer described by this poll, if it describes one
    pub fn offer(&self) -> Option<IncomingCallOffer> {
        if !self.has_incoming {
            return None;
        }
        let call_id = self.call_id.as_ref().filter(|id| !id.is_empty())?;
        Some(IncomingCallOffer {
            call_id: call_id.clone(),
            caller_name: self
                .caller_name
                .clone()
                .unwrap_or_else(|| "Someone".to_string()),
            call_type: self.call_type.unwrap_or_default(),
        })
    }
}

/// A call waiting for the listener's decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncomingCallOffer {
    pub call_id: String,
    pub caller_name: String,
    pub call_type: CallType,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcceptCallResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub hms_token: Option<String>,
    #[serde(default)]
    pub hms_room_id: Option<String>,
    #[serde(default)]
    pub rate_per_min: Option<Decimal>,
}

impl AcceptCallResponse {
    pub fn room(&self) -> Option<RoomCredentials> {
        RoomCredentials::from_parts(self.hms_room_id.as_ref(), self.hms_token.as_ref())
    }
}

/// An accepted offer, handed to the call session controller
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedCall {
    pub offer: IncomingCallOffer,
    pub room: Option<RoomCredentials>,
    pub rate_per_min: Option<Decimal>,
    pub accepted_at: DateTime<Utc>,
}

impl AcceptedCall {
    pub fn new(offer: IncomingCallOffer, response: &AcceptCallResponse) -> Self {
        Self {
            offer,
            room: response.room(),
            rate_per_min: response.rate_per_min,
            accepted_at: Utc::now(),
        }
    }

    #[inline]
    pub fn call_id(&self) -> &str {
        &self.offer.call_id
    }
}

// ==================== Epilogue ====================

/// Final figures for a completed call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSummary {
    pub call_id: String,
    pub duration_seconds: u64,
    pub cost: Decimal,
    /// True when a figure had to fall back to the local estimate
    pub estimated: bool,
    pub ended_at: DateTime<Utc>,
}

impl CallSummary {
    /// Settle a call; server figures win over local ones
    pub fn settle(
        call_id: &str,
        response: &EndCallResponse,
        local_seconds: u64,
        local_cost: Decimal,
    ) -> Self {
        Self {
            call_id: call_id.to_string(),
            duration_seconds: response.duration_seconds.unwrap_or(local_seconds),
            cost: response.cost.unwrap_or(local_cost),
            estimated: response.duration_seconds.is_none() || response.cost.is_none(),
            ended_at: Utc::now(),
        }
    }
}
