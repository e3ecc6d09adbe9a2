//! Test doubles for the `VoiceMatchApi` seam
//!
//! `ScriptedApi` answers from per-endpoint scripts and records every call,
//! so tests can assert on side effects (how many end-calls, whether a poll
//! happened after teardown). KYC endpoints are left to `MockVoiceMatchApi`.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::time::Duration;
use voicematch_core::models::{
    AcceptCallResponse, CallStatusResponse, EndCallResponse, IdType, IncomingCheck,
    KycStatusResponse, RatingRequest, RemoteCallStatus, ReportRequest, StartCallRequest,
    StartCallResponse, StartedCall, SuccessResponse, ToggleOnlineResponse, UploadIdResponse,
    UploadSelfieResponse,
};
use voicematch_core::{ClientError, ClientResult};

use crate::traits::VoiceMatchApi;

/// A recorded request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    StartCall(String),
    CallStatus(String),
    EndCall(String),
    CheckIncoming,
    AcceptCall(String),
    RejectCall(String),
    Heartbeat,
    SetOnline(bool),
    KycStatus,
    UploadId(IdType),
    ConfirmIdData,
    UploadSelfie,
    SubmitRating(String),
    SubmitReport(String),
}

struct Script {
    start: ClientResult<StartCallResponse>,
    statuses: VecDeque<ClientResult<RemoteCallStatus>>,
    idle_status: RemoteCallStatus,
    status_delay: Option<Duration>,
    end: ClientResult<EndCallResponse>,
    incoming: VecDeque<ClientResult<IncomingCheck>>,
    idle_incoming: IncomingCheck,
    incoming_delay: Option<Duration>,
    accepts: VecDeque<ClientResult<AcceptCallResponse>>,
    accept_delay: Option<Duration>,
    reject: ClientResult<()>,
    heartbeat: ClientResult<()>,
    rating: ClientResult<SuccessResponse>,
}

/// Scripted in-memory backend
pub struct ScriptedApi {
    script: Mutex<Script>,
    calls: Mutex<Vec<ApiCall>>,
}

impl Default for ScriptedApi {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedApi {
    /// Backend that starts `call-1` at 5/min, keeps it ringing, and reports
    /// no incoming calls
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                start: Ok(started("call-1", Decimal::from(5))),
                statuses: VecDeque::new(),
                idle_status: RemoteCallStatus::Pending,
                status_delay: None,
                end: Ok(EndCallResponse::default()),
                incoming: VecDeque::new(),
                idle_incoming: IncomingCheck::default(),
                incoming_delay: None,
                accepts: VecDeque::new(),
                accept_delay: None,
                reject: Ok(()),
                heartbeat: Ok(()),
                rating: Ok(SuccessResponse {
                    success: true,
                    message: None,
                }),
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    // ==================== Scripting ====================

    pub fn with_start(self, result: ClientResult<StartCallResponse>) -> Self {
        self.script.lock().start = result;
        self
    }

    /// Queue the next `calls/status` answers, in order
    pub fn with_statuses(self, statuses: Vec<ClientResult<RemoteCallStatus>>) -> Self {
        self.script.lock().statuses.extend(statuses);
        self
    }

    /// Status reported once the queue is drained
    pub fn with_idle_status(self, status: RemoteCallStatus) -> Self {
        self.script.lock().idle_status = status;
        self
    }

    /// Hold every `calls/status` answer for `delay`
    pub fn with_status_delay(self, delay: Duration) -> Self {
        self.script.lock().status_delay = Some(delay);
        self
    }

    pub fn with_end(self, result: ClientResult<EndCallResponse>) -> Self {
        self.script.lock().end = result;
        self
    }

    /// Queue the next `calls/check-incoming` answers, in order
    pub fn with_incoming(self, checks: Vec<ClientResult<IncomingCheck>>) -> Self {
        self.script.lock().incoming.extend(checks);
        self
    }

    /// Answer reported once the incoming queue is drained
    pub fn with_idle_incoming(self, check: IncomingCheck) -> Self {
        self.script.lock().idle_incoming = check;
        self
    }

    /// Hold every `calls/check-incoming` answer for `delay`
    pub fn with_incoming_delay(self, delay: Duration) -> Self {
        self.script.lock().incoming_delay = Some(delay);
        self
    }

    pub fn with_accepts(self, results: Vec<ClientResult<AcceptCallResponse>>) -> Self {
        self.script.lock().accepts.extend(results);
        self
    }

    pub fn with_accept_delay(self, delay: Duration) -> Self {
        self.script.lock().accept_delay = Some(delay);
        self
    }

    pub fn with_reject(self, result: ClientResult<()>) -> Self {
        self.script.lock().reject = result;
        self
    }

    pub fn with_heartbeat(self, result: ClientResult<()>) -> Self {
        self.script.lock().heartbeat = result;
        self
    }

    pub fn with_rating(self, result: ClientResult<SuccessResponse>) -> Self {
        self.script.lock().rating = result;
        self
    }

    /// Replace the incoming answer while a test is running
    pub fn set_idle_incoming(&self, check: IncomingCheck) {
        self.script.lock().idle_incoming = check;
    }

    // ==================== Inspection ====================

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    pub fn end_calls(&self) -> usize {
        self.count(|call| matches!(call, ApiCall::EndCall(_)))
    }

    pub fn status_polls(&self) -> usize {
        self.count(|call| matches!(call, ApiCall::CallStatus(_)))
    }

    pub fn incoming_polls(&self) -> usize {
        self.count(|call| matches!(call, ApiCall::CheckIncoming))
    }

    pub fn heartbeats(&self) -> usize {
        self.count(|call| matches!(call, ApiCall::Heartbeat))
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().push(call);
    }
}

// ==================== Fixtures ====================

pub fn started(call_id: &str, rate_per_min: Decimal) -> StartCallResponse {
    StartCallResponse {
        success: true,
        call: StartedCall {
            id: call_id.to_string(),
            rate_per_min,
            is_first_call: false,
            hms_room_id: Some(format!("room-{}", call_id)),
            hms_token: Some("hms-token".to_string()),
        },
    }
}

pub fn incoming(call_id: &str, caller_name: &str) -> IncomingCheck {
    IncomingCheck {
        has_incoming: true,
        call_id: Some(call_id.to_string()),
        caller_name: Some(caller_name.to_string()),
        call_type: None,
    }
}

pub fn no_incoming() -> IncomingCheck {
    IncomingCheck::default()
}

pub fn settled(duration_seconds: u64, cost: Decimal) -> EndCallResponse {
    EndCallResponse {
        success: true,
        duration_seconds: Some(duration_seconds),
        cost: Some(cost),
        listener_earned: None,
    }
}

pub fn network_error() -> ClientError {
    ClientError::Transport("connection reset".to_string())
}

fn not_scripted(endpoint: &str) -> ClientError {
    ClientError::api(501, Some(format!("{} is not scripted", endpoint)))
}

#[async_trait]
impl VoiceMatchApi for ScriptedApi {
    async fn start_call(&self, request: &StartCallRequest) -> ClientResult<StartCallResponse> {
        self.record(ApiCall::StartCall(request.listener_id.clone()));
        self.script.lock().start.clone()
    }

    async fn call_status(&self, call_id: &str) -> ClientResult<CallStatusResponse> {
        self.record(ApiCall::CallStatus(call_id.to_string()));
        let (delay, result) = {
            let mut script = self.script.lock();
            let idle = script.idle_status;
            let result = script.statuses.pop_front().unwrap_or(Ok(idle));
            (script.status_delay, result)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result.map(|status| CallStatusResponse { status })
    }

    async fn end_call(&self, call_id: &str) -> ClientResult<EndCallResponse> {
        self.record(ApiCall::EndCall(call_id.to_string()));
        self.script.lock().end.clone()
    }

    async fn check_incoming(&self) -> ClientResult<IncomingCheck> {
        self.record(ApiCall::CheckIncoming);
        let (delay, result) = {
            let mut script = self.script.lock();
            let result = match script.incoming.pop_front() {
                Some(next) => next,
                None => Ok(script.idle_incoming.clone()),
            };
            (script.incoming_delay, result)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn accept_call(&self, call_id: &str) -> ClientResult<AcceptCallResponse> {
        self.record(ApiCall::AcceptCall(call_id.to_string()));
        let (delay, result) = {
            let mut script = self.script.lock();
            let result = script.accepts.pop_front().unwrap_or_else(|| {
                Ok(AcceptCallResponse {
                    success: true,
                    hms_token: Some("hms-listener-token".to_string()),
                    hms_room_id: Some(format!("room-{}", call_id)),
                    rate_per_min: None,
                })
            });
            (script.accept_delay, result)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }

    async fn reject_call(&self, call_id: &str) -> ClientResult<()> {
        self.record(ApiCall::RejectCall(call_id.to_string()));
        self.script.lock().reject.clone()
    }

    async fn heartbeat(&self) -> ClientResult<()> {
        self.record(ApiCall::Heartbeat);
        self.script.lock().heartbeat.clone()
    }

    async fn set_online(&self, online: bool) -> ClientResult<ToggleOnlineResponse> {
        self.record(ApiCall::SetOnline(online));
        Ok(ToggleOnlineResponse {
            success: true,
            online,
        })
    }

    async fn kyc_status(&self) -> ClientResult<KycStatusResponse> {
        self.record(ApiCall::KycStatus);
        Err(not_scripted("kyc/status"))
    }

    async fn upload_id(&self, id_type: IdType, _image: &[u8]) -> ClientResult<UploadIdResponse> {
        self.record(ApiCall::UploadId(id_type));
        Err(not_scripted("kyc/upload-id"))
    }

    async fn confirm_id_data(&self) -> ClientResult<SuccessResponse> {
        self.record(ApiCall::ConfirmIdData);
        Err(not_scripted("kyc/confirm-id-data"))
    }

    async fn upload_selfie(&self, _video: &[u8]) -> ClientResult<UploadSelfieResponse> {
        self.record(ApiCall::UploadSelfie);
        Err(not_scripted("kyc/upload-selfie"))
    }

    async fn submit_rating(&self, request: &RatingRequest) -> ClientResult<SuccessResponse> {
        self.record(ApiCall::SubmitRating(request.call_id.clone()));
        self.script.lock().rating.clone()
    }

    async fn submit_report(&self, request: &ReportRequest) -> ClientResult<SuccessResponse> {
        self.record(ApiCall::SubmitReport(request.reported_user_id.clone()));
        Ok(SuccessResponse {
            success: true,
            message: Some("Report submitted".to_string()),
        })
    }
}
