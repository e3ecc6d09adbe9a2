//! Typed backend contract consumed by the client controllers

use async_trait::async_trait;
use voicematch_core::models::{
    AcceptCallResponse, CallStatusResponse, EndCallResponse, IdType, IncomingCheck,
    KycStatusResponse, RatingRequest, ReportRequest, StartCallRequest, StartCallResponse,
    SuccessResponse, ToggleOnlineResponse, UploadIdResponse, UploadSelfieResponse,
};
use voicematch_core::ClientResult;

/// One method per backend endpoint used by the core
///
/// Every method surfaces a non-success response as `ClientError::Api`;
/// retry policy belongs to the caller.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait VoiceMatchApi: Send + Sync {
    // ==================== Calls ====================

    /// `POST /calls/start`
    async fn start_call(&self, request: &StartCallRequest) -> ClientResult<StartCallResponse>;

    /// `GET /calls/status/{call_id}`
    async fn call_status(&self, call_id: &str) -> ClientResult<CallStatusResponse>;

    /// `POST /calls/end`
    async fn end_call(&self, call_id: &str) -> ClientResult<EndCallResponse>;

    /// `GET /calls/check-incoming`
    async fn check_incoming(&self) -> ClientResult<IncomingCheck>;

    /// `POST /calls/accept`
    async fn accept_call(&self, call_id: &str) -> ClientResult<AcceptCallResponse>;

    /// `POST /calls/reject`
    async fn reject_call(&self, call_id: &str) -> ClientResult<()>;

    // ==================== Listener presence ====================

    /// `POST /listeners/heartbeat`
    async fn heartbeat(&self) -> ClientResult<()>;

    /// `POST /listeners/toggle-online`
    async fn set_online(&self, online: bool) -> ClientResult<ToggleOnlineResponse>;

    // ==================== KYC ====================

    /// `GET /kyc/status`
    async fn kyc_status(&self) -> ClientResult<KycStatusResponse>;

    /// `POST /kyc/upload-id`
    async fn upload_id(&self, id_type: IdType, image: &[u8]) -> ClientResult<UploadIdResponse>;

    /// `POST /kyc/confirm-id-data`
    async fn confirm_id_data(&self) -> ClientResult<SuccessResponse>;

    /// `POST /kyc/upload-selfie`
    async fn upload_selfie(&self, video: &[u8]) -> ClientResult<UploadSelfieResponse>;

    // ==================== Feedback ====================

    /// `POST /ratings/submit`
    async fn submit_rating(&self, request: &RatingRequest) -> ClientResult<SuccessResponse>;

    /// `POST /reports/submit`
    async fn submit_report(&self, request: &ReportRequest) -> ClientResult<SuccessResponse>;
}
