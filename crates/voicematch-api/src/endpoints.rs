//! `VoiceMatchApi` over HTTP
//!
//! Route table and payload shaping. Binary payloads (ID image, selfie
//! video) are sent base64-encoded.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{info, instrument};
use validator::Validate;
use voicematch_core::models::{
    AcceptCallResponse, CallIdRequest, CallStatusResponse, EndCallResponse, IdType, IncomingCheck,
    KycStatusResponse, RatingRequest, ReportRequest, StartCallRequest, StartCallResponse,
    SuccessResponse, ToggleOnlineRequest, ToggleOnlineResponse, UploadIdRequest, UploadIdResponse,
    UploadSelfieRequest, UploadSelfieResponse,
};
use voicematch_core::ClientResult;

use crate::client::ApiClient;
use crate::traits::VoiceMatchApi;

/// Body-less POST
const NO_BODY: Option<&()> = None;

#[async_trait]
impl VoiceMatchApi for ApiClient {
    #[instrument(skip(self, request), fields(listener_id = %request.listener_id, call_type = %request.call_type))]
    async fn start_call(&self, request: &StartCallRequest) -> ClientResult<StartCallResponse> {
        request.validate()?;
        let response: StartCallResponse = self.post("/calls/start", Some(request)).await?;
        info!(
            "Call started: call_id={}, rate_per_min={}",
            response.call.id, response.call.rate_per_min
        );
        Ok(response)
    }

    async fn call_status(&self, call_id: &str) -> ClientResult<CallStatusResponse> {
        self.get(&format!("/calls/status/{}", call_id)).await
    }

    #[instrument(skip(self))]
    async fn end_call(&self, call_id: &str) -> ClientResult<EndCallResponse> {
        self.post("/calls/end", Some(&CallIdRequest::new(call_id)))
            .await
    }

    async fn check_incoming(&self) -> ClientResult<IncomingCheck> {
        self.get("/calls/check-incoming").await
    }

    #[instrument(skip(self))]
    async fn accept_call(&self, call_id: &str) -> ClientResult<AcceptCallResponse> {
        self.post("/calls/accept", Some(&CallIdRequest::new(call_id)))
            .await
    }

    #[instrument(skip(self))]
    async fn reject_call(&self, call_id: &str) -> ClientResult<()> {
        let _: serde_json::Value = self
            .post("/calls/reject", Some(&CallIdRequest::new(call_id)))
            .await?;
        Ok(())
    }

    async fn heartbeat(&self) -> ClientResult<()> {
        let _: serde_json::Value = self.post("/listeners/heartbeat", NO_BODY).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_online(&self, online: bool) -> ClientResult<ToggleOnlineResponse> {
        self.post("/listeners/toggle-online", Some(&ToggleOnlineRequest { online }))
            .await
    }

    async fn kyc_status(&self) -> ClientResult<KycStatusResponse> {
        self.get("/kyc/status").await
    }

    #[instrument(skip(self, image), fields(image_bytes = image.len()))]
    async fn upload_id(&self, id_type: IdType, image: &[u8]) -> ClientResult<UploadIdResponse> {
        let request = UploadIdRequest {
            id_type,
            id_image_base64: STANDARD.encode(image),
        };
        self.post("/kyc/upload-id", Some(&request)).await
    }

    #[instrument(skip(self))]
    async fn confirm_id_data(&self) -> ClientResult<SuccessResponse> {
        self.post("/kyc/confirm-id-data", NO_BODY).await
    }

    #[instrument(skip(self, video), fields(video_bytes = video.len()))]
    async fn upload_selfie(&self, video: &[u8]) -> ClientResult<UploadSelfieResponse> {
        let request = UploadSelfieRequest {
            video_base64: STANDARD.encode(video),
        };
        self.post("/kyc/upload-selfie", Some(&request)).await
    }

    #[instrument(skip(self, request), fields(call_id = %request.call_id, rating = request.rating.as_str()))]
    async fn submit_rating(&self, request: &RatingRequest) -> ClientResult<SuccessResponse> {
        request.validate()?;
        self.post("/ratings/submit", Some(request)).await
    }

    #[instrument(skip(self, request), fields(reported_user_id = %request.reported_user_id))]
    async fn submit_report(&self, request: &ReportRequest) -> ClientResult<SuccessResponse> {
        request.validate()?;
        self.post("/reports/submit", Some(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicematch_core::models::CallType;
    use voicematch_core::ClientError;

    fn client() -> ApiClient {
        // Port 9 (discard) is never listened on in test environments
        ApiClient::new("http://127.0.0.1:9", None).unwrap()
    }

    #[tokio::test]
    async fn test_start_call_validates_before_sending() {
        let err = client()
            .start_call(&StartCallRequest::new("", CallType::Voice))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let err = client().check_incoming().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_upload_payload_is_base64() {
        let request = UploadIdRequest {
            id_type: IdType::Pan,
            id_image_base64: STANDARD.encode(b"\x89PNG"),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["id_type"], "pan");
        assert_eq!(json["id_image_base64"], "iVBORw==");
    }
}
