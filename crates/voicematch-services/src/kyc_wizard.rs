//! Listener KYC wizard
//!
//! Linear flow: start -> upload ID -> confirm extracted data -> selfie ->
//! processing -> result. Progress lives on the backend, so `resume` picks
//! the wizard up at the server-reported step. Captured images are held
//! only until they are uploaded.

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument, warn};
use voicematch_api::VoiceMatchApi;
use voicematch_core::config::KycConfig;
use voicematch_core::models::{
    AgeVerification, ExtractedData, FinalResult, IdType, KycStatusResponse,
};
use voicematch_core::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KycStep {
    Start,
    UploadId,
    ConfirmData,
    Selfie,
    Processing,
    Result,
}

impl KycStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            KycStep::Start => "start",
            KycStep::UploadId => "upload_id",
            KycStep::ConfirmData => "confirm_data",
            KycStep::Selfie => "selfie",
            KycStep::Processing => "processing",
            KycStep::Result => "result",
        }
    }
}

impl fmt::Display for KycStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum KycState {
    Start,
    UploadId {
        id_type: Option<IdType>,
        id_image: Option<Vec<u8>>,
    },
    ConfirmData {
        extracted: ExtractedData,
        age: AgeVerification,
    },
    Selfie {
        extracted: ExtractedData,
        age: AgeVerification,
        selfie: Option<Vec<u8>>,
    },
    Processing,
    Result(FinalResult),
}

impl KycState {
    /// State to resume at, from `kyc/status`
    ///
    /// A terminal status wins; otherwise step 1 is confirm-data, step 2 is
    /// selfie, and anything else starts over.
    pub fn from_status(status: &KycStatusResponse) -> Self {
        if let Some(result) = status.terminal_result() {
            return KycState::Result(result);
        }

        let extracted = status.extracted_data.clone().unwrap_or_default();
        let age = status.age_verification.clone().unwrap_or_default();
        match status.step {
            Some(1) => KycState::ConfirmData { extracted, age },
            Some(2) => KycState::Selfie {
                extracted,
                age,
                selfie: None,
            },
            _ => KycState::Start,
        }
    }

    pub fn step(&self) -> KycStep {
        match self {
            KycState::Start => KycStep::Start,
            KycState::UploadId { .. } => KycStep::UploadId,
            KycState::ConfirmData { .. } => KycStep::ConfirmData,
            KycState::Selfie { .. } => KycStep::Selfie,
            KycState::Processing => KycStep::Processing,
            KycState::Result(_) => KycStep::Result,
        }
    }

    pub fn result(&self) -> Option<&FinalResult> {
        match self {
            KycState::Result(result) => Some(result),
            _ => None,
        }
    }
}

pub struct KycWizard {
    api: Arc<dyn VoiceMatchApi>,
    config: KycConfig,
    state: watch::Sender<KycState>,
}

impl KycWizard {
    pub fn new(api: Arc<dyn VoiceMatchApi>, config: KycConfig) -> Self {
        let (state, _) = watch::channel(KycState::Start);
        Self { api, config, state }
    }

    pub fn state(&self) -> KycState {
        self.state.borrow().clone()
    }

    pub fn step(&self) -> KycStep {
        self.state.borrow().step()
    }

    pub fn subscribe(&self) -> watch::Receiver<KycState> {
        self.state.subscribe()
    }

    /// Rehydrate from the backend; on failure the wizard stays where it is
    #[instrument(skip(self))]
    pub async fn resume(&mut self) -> ClientResult<KycStep> {
        let status = self.api.kyc_status().await?;
        let state = KycState::from_status(&status);
        info!(
            "KYC resumed at {} (server status={}, step={:?})",
            state.step(),
            status.status,
            status.step
        );
        self.set(state);
        Ok(self.step())
    }

    pub fn begin(&mut self) -> ClientResult<()> {
        match self.state() {
            KycState::Start => {
                self.set(KycState::UploadId {
                    id_type: None,
                    id_image: None,
                });
                Ok(())
            }
            other => Err(invalid("begin", &other)),
        }
    }

    /// Select the document type and attach its photo
    pub fn attach_id_image(&mut self, id_type: IdType, image: Vec<u8>) -> ClientResult<()> {
        match self.state() {
            KycState::UploadId { .. } => {
                self.set(KycState::UploadId {
                    id_type: Some(id_type),
                    id_image: Some(image),
                });
                Ok(())
            }
            other => Err(invalid("attach an ID image", &other)),
        }
    }

    /// Upload the ID photo
    ///
    /// An underage holder ends the wizard immediately with a rejection.
    #[instrument(skip(self))]
    pub async fn submit_id(&mut self) -> ClientResult<KycStep> {
        let state = self.state();
        let KycState::UploadId {
            id_type: Some(id_type),
            id_image: Some(image),
        } = &state
        else {
            return Err(ClientError::MissingField(
                "ID type and image are required".to_string(),
            ));
        };

        let response = self.api.upload_id(*id_type, image).await?;

        if !response.age_verification.is_18_plus {
            warn!(
                "KYC stopped: ID holder is under 18 (age={:?})",
                response.age_verification.age
            );
            self.set(KycState::Result(FinalResult::underage()));
        } else {
            info!(
                "ID uploaded: type={}, confidence={:.2}",
                id_type, response.extracted_data.confidence
            );
            self.set(KycState::ConfirmData {
                extracted: response.extracted_data,
                age: response.age_verification,
            });
        }
        Ok(self.step())
    }

    #[instrument(skip(self))]
    pub async fn confirm_data(&mut self) -> ClientResult<()> {
        let KycState::ConfirmData { extracted, age } = self.state() else {
            return Err(invalid("confirm data", &self.state()));
        };

        self.api.confirm_id_data().await?;
        self.set(KycState::Selfie {
            extracted,
            age,
            selfie: None,
        });
        Ok(())
    }

    pub fn attach_selfie(&mut self, video: Vec<u8>) -> ClientResult<()> {
        match self.state() {
            KycState::Selfie { extracted, age, .. } => {
                self.set(KycState::Selfie {
                    extracted,
                    age,
                    selfie: Some(video),
                });
                Ok(())
            }
            other => Err(invalid("attach a selfie", &other)),
        }
    }

    /// Upload the selfie and wait for the verdict
    ///
    /// `Processing` is shown for at least the configured dwell. On failure
    /// the wizard returns to the selfie step with the capture kept.
    #[instrument(skip(self))]
    pub async fn submit_selfie(&mut self) -> ClientResult<FinalResult> {
        let KycState::Selfie {
            extracted,
            age,
            selfie: Some(video),
        } = self.state()
        else {
            return Err(ClientError::MissingField("Selfie is required".to_string()));
        };

        self.set(KycState::Processing);
        let (result, _) = tokio::join!(
            self.api.upload_selfie(&video),
            tokio::time::sleep(self.config.processing_dwell())
        );

        match result {
            Ok(response) => {
                info!(
                    "KYC finished: status={}, auto_approved={}",
                    response.final_result.status.as_str(),
                    response.final_result.auto_approved
                );
                self.set(KycState::Result(response.final_result.clone()));
                Ok(response.final_result)
            }
            Err(e) => {
                warn!("Selfie upload failed: {}", e);
                self.set(KycState::Selfie {
                    extracted,
                    age,
                    selfie: Some(video),
                });
                Err(e)
            }
        }
    }

    /// Step back one screen
    pub fn back(&mut self) -> ClientResult<KycStep> {
        let previous = match self.state() {
            KycState::UploadId { .. } => KycState::Start,
            KycState::ConfirmData { .. } => KycState::UploadId {
                id_type: None,
                id_image: None,
            },
            KycState::Selfie { extracted, age, .. } => KycState::ConfirmData { extracted, age },
            other => return Err(invalid("go back", &other)),
        };
        self.set(previous);
        Ok(self.step())
    }

    fn set(&self, state: KycState) {
        self.state.send_replace(state);
    }
}

fn invalid(action: &str, state: &KycState) -> ClientError {
    ClientError::InvalidTransition(format!("cannot {} at step {}", action, state.step()))
}
