//! Post-call rating and reporting
//!
//! Offered once a call completes. The rating is optional: the user may
//! skip it, and a submission is accepted at most once.

use std::sync::Arc;
use tracing::{info, instrument, warn};
use voicematch_api::VoiceMatchApi;
use voicematch_core::billing::format_duration;
use voicematch_core::models::{CallSummary, Rating, RatingRequest, ReportRequest};
use voicematch_core::{ClientError, ClientResult};

use crate::call_session::CallOutcome;

pub struct RatingEpilogue {
    api: Arc<dyn VoiceMatchApi>,
    summary: CallSummary,
    closed: bool,
}

impl RatingEpilogue {
    pub fn new(api: Arc<dyn VoiceMatchApi>, summary: CallSummary) -> Self {
        Self {
            api,
            summary,
            closed: false,
        }
    }

    /// Only completed calls are rated
    pub fn for_outcome(api: Arc<dyn VoiceMatchApi>, outcome: &CallOutcome) -> Option<Self> {
        outcome
            .summary()
            .map(|summary| Self::new(api, summary.clone()))
    }

    pub fn summary(&self) -> &CallSummary {
        &self.summary
    }

    /// "Xm Ys" for the summary screen
    pub fn duration_label(&self) -> String {
        format_duration(self.summary.duration_seconds)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[instrument(skip(self, feedback), fields(call_id = %self.summary.call_id))]
    pub async fn submit(&mut self, rating: Rating, feedback: Option<String>) -> ClientResult<()> {
        if self.closed {
            return Err(ClientError::InvalidTransition(
                "rating already closed".to_string(),
            ));
        }

        let request = RatingRequest {
            call_id: self.summary.call_id.clone(),
            rating,
            feedback: feedback.filter(|text| !text.trim().is_empty()),
        };
        self.api.submit_rating(&request).await?;

        info!(
            "⭐ Rated call {}: {}",
            self.summary.call_id,
            rating.as_str()
        );
        self.closed = true;
        Ok(())
    }

    pub fn skip(&mut self) {
        if !self.closed {
            info!("Rating skipped for call {}", self.summary.call_id);
        }
        self.closed = true;
    }

    /// Report the other party of this call
    pub async fn report(
        &self,
        reported_user_id: &str,
        reason: &str,
        details: Option<String>,
    ) -> ClientResult<()> {
        report_user(
            self.api.as_ref(),
            reported_user_id,
            Some(&self.summary.call_id),
            reason,
            details,
        )
        .await
    }
}

#[instrument(skip(api, details))]
pub async fn report_user(
    api: &dyn VoiceMatchApi,
    reported_user_id: &str,
    call_id: Option<&str>,
    reason: &str,
    details: Option<String>,
) -> ClientResult<()> {
    let request = ReportRequest {
        reported_user_id: reported_user_id.to_string(),
        call_id: call_id.map(str::to_string),
        reason: reason.to_string(),
        details,
    };

    match api.submit_report(&request).await {
        Ok(_) => {
            info!("🚩 Reported user {}", reported_user_id);
            Ok(())
        }
        Err(e) => {
            warn!("Report for {} failed: {}", reported_user_id, e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use voicematch_api::testing::{network_error, settled, ApiCall, ScriptedApi};

    fn summary() -> CallSummary {
        CallSummary::settle("c-1", &settled(125, dec!(10.42)), 0, dec!(0))
    }

    #[test]
    fn test_only_completed_calls_are_rated() {
        let api: Arc<dyn VoiceMatchApi> = Arc::new(ScriptedApi::new());

        let epilogue =
            RatingEpilogue::for_outcome(api.clone(), &CallOutcome::Completed(summary()));
        assert_eq!(epilogue.unwrap().duration_label(), "2m 5s");

        assert!(RatingEpilogue::for_outcome(api.clone(), &CallOutcome::Rejected).is_none());
        assert!(RatingEpilogue::for_outcome(api, &CallOutcome::TornDown).is_none());
    }

    #[tokio::test]
    async fn test_rating_is_submitted_once() {
        let api = Arc::new(ScriptedApi::new());
        let mut epilogue = RatingEpilogue::new(api.clone(), summary());

        epilogue
            .submit(Rating::Great, Some("Very kind".to_string()))
            .await
            .unwrap();
        assert!(epilogue.is_closed());

        let err = epilogue.submit(Rating::Bad, None).await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidTransition(_)));
        assert_eq!(
            api.count(|call| matches!(call, ApiCall::SubmitRating(_))),
            1
        );
    }

    #[tokio::test]
    async fn test_failed_rating_can_be_retried() {
        let api = Arc::new(ScriptedApi::new().with_rating(Err(network_error())));
        let mut epilogue = RatingEpilogue::new(api.clone(), summary());

        assert!(epilogue.submit(Rating::Good, None).await.is_err());
        assert!(!epilogue.is_closed());

        epilogue.skip();
        assert!(epilogue.is_closed());
    }

    #[tokio::test]
    async fn test_report_carries_call_id() {
        let api = Arc::new(ScriptedApi::new());
        let epilogue = RatingEpilogue::new(api.clone(), summary());

        epilogue
            .report("listener-1", "Inappropriate language", None)
            .await
            .unwrap();
        assert!(api
            .calls()
            .contains(&ApiCall::SubmitReport("listener-1".to_string())));
    }

    #[tokio::test]
    async fn test_report_without_call() {
        let api = ScriptedApi::new();
        assert!(report_user(&api, "seeker-9", None, "Spam", None).await.is_ok());
        assert_eq!(api.calls(), vec![ApiCall::SubmitReport("seeker-9".to_string())]);
    }
}
