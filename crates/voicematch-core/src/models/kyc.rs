//! KYC models
//!
//! Identity verification is decided by the backend. The client only carries
//! what the server extracted and the final verdict.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Issue code attached to a result forced by the age gate
pub const UNDERAGE_ISSUE: &str = "underage";

/// Identity document type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    #[default]
    Aadhaar,
    Pan,
    Passport,
    DrivingLicense,
    VoterId,
}

impl IdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdType::Aadhaar => "aadhaar",
            IdType::Pan => "pan",
            IdType::Passport => "passport",
            IdType::DrivingLicense => "driving_license",
            IdType::VoterId => "voter_id",
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "aadhaar" => Ok(IdType::Aadhaar),
            "pan" => Ok(IdType::Pan),
            "passport" => Ok(IdType::Passport),
            "driving_license" => Ok(IdType::DrivingLicense),
            "voter_id" => Ok(IdType::VoterId),
            other => Err(format!("unknown ID type: {}", other)),
        }
    }
}

/// Fields read from the uploaded document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dob: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeVerification {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub is_18_plus: bool,
}

/// Terminal verdict of the verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycVerdict {
    Verified,
    Rejected,
    #[serde(other)]
    PendingReview,
}

impl KycVerdict {
    /// Maps a `kyc/status` status string to a terminal verdict
    pub fn from_status(status: &str) -> Option<Self> {
        match status {
            "verified" => Some(KycVerdict::Verified),
            "pending_review" => Some(KycVerdict::PendingReview),
            "rejected" => Some(KycVerdict::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KycVerdict::Verified => "verified",
            KycVerdict::PendingReview => "pending_review",
            KycVerdict::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub status: KycVerdict,
    #[serde(default)]
    pub auto_approved: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub message: String,
}

impl FinalResult {
    /// Result forced locally when the document shows the holder is under 18
    pub fn underage() -> Self {
        Self {
            status: KycVerdict::Rejected,
            auto_approved: false,
            issues: vec![UNDERAGE_ISSUE.to_string()],
            message: "You must be 18 or older to become a listener".to_string(),
        }
    }

    pub fn is_underage(&self) -> bool {
        self.issues.iter().any(|issue| issue == UNDERAGE_ISSUE)
    }
}

/// Server-reported wizard progress, consumed on every mount
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KycStatusResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub step: Option<i64>,
    #[serde(default)]
    pub extracted_data: Option<ExtractedData>,
    #[serde(default)]
    pub age_verification: Option<AgeVerification>,
    #[serde(default)]
    pub final_result: Option<FinalResult>,
    #[serde(default)]
    pub message: Option<String>,
}

impl KycStatusResponse {
    /// Terminal result, synthesized from `status`/`message` when the server
    /// does not send one
    pub fn terminal_result(&self) -> Option<FinalResult> {
        let verdict = KycVerdict::from_status(&self.status)?;
        Some(self.final_result.clone().unwrap_or_else(|| FinalResult {
            status: verdict,
            auto_approved: false,
            issues: Vec::new(),
            message: self.message.clone().unwrap_or_default(),
        }))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadIdRequest {
    pub id_type: IdType,
    pub id_image_base64: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadIdResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub extracted_data: ExtractedData,
    #[serde(default)]
    pub age_verification: AgeVerification,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadSelfieRequest {
    pub video_base64: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadSelfieResponse {
    pub final_result: FinalResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_result_from_status() {
        let status: KycStatusResponse =
            serde_json::from_str(r#"{"status": "verified", "message": "All good"}"#).unwrap();
        let result = status.terminal_result().unwrap();
        assert_eq!(result.status, KycVerdict::Verified);
        assert_eq!(result.message, "All good");

        let in_progress: KycStatusResponse =
            serde_json::from_str(r#"{"status": "in_progress", "step": 1}"#).unwrap();
        assert!(in_progress.terminal_result().is_none());
    }

    #[test]
    fn test_terminal_result_prefers_server_result() {
        let status: KycStatusResponse = serde_json::from_str(
            r#"{"status": "rejected",
                "final_result": {"status": "rejected", "issues": ["face_mismatch"], "message": "Mismatch"}}"#,
        )
        .unwrap();
        let result = status.terminal_result().unwrap();
        assert_eq!(result.issues, vec!["face_mismatch".to_string()]);
        assert!(!result.is_underage());
    }

    #[test]
    fn test_unknown_verdict_is_pending_review() {
        let result: FinalResult =
            serde_json::from_str(r#"{"status": "manual_check"}"#).unwrap();
        assert_eq!(result.status, KycVerdict::PendingReview);
    }

    #[test]
    fn test_underage_result() {
        let result = FinalResult::underage();
        assert_eq!(result.status, KycVerdict::Rejected);
        assert!(result.is_underage());
        assert!(!result.auto_approved);
    }

    #[test]
    fn test_age_verification_field_name() {
        let age: AgeVerification =
            serde_json::from_str(r#"{"age": 17, "is_18_plus": false}"#).unwrap();
        assert_eq!(age.age, Some(17));
        assert!(!age.is_18_plus);
    }

    #[test]
    fn test_id_type_from_str() {
        assert_eq!("driving-license".parse::<IdType>().unwrap(), IdType::DrivingLicense);
        assert_eq!("PAN".parse::<IdType>().unwrap(), IdType::Pan);
        assert!("library_card".parse::<IdType>().is_err());
    }
}
