//! Wire and domain models for the VoiceMatch client
//!
//! The backend is the source of truth for everything here; these types only
//! describe what the client sends and what it keeps in memory.

pub mod call;
pub mod feedback;
pub mod kyc;
pub mod listener;

pub use call::{
    AcceptCallResponse, AcceptedCall, CallIdRequest, CallStatusResponse, CallSummary, CallType,
    EndCallResponse, IncomingCallOffer, IncomingCheck, RemoteCallStatus, RoomCredentials,
    StartCallRequest, StartCallResponse, StartedCall,
};
pub use feedback::{Rating, RatingRequest, ReportRequest};
pub use kyc::{
    AgeVerification, ExtractedData, FinalResult, IdType, KycStatusResponse, KycVerdict,
    UploadIdRequest, UploadIdResponse, UploadSelfieRequest, UploadSelfieResponse, UNDERAGE_ISSUE,
};
pub use listener::{ToggleOnlineRequest, ToggleOnlineResponse};

use serde::Deserialize;

/// Generic `{success, message?}` acknowledgement
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuccessResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}
