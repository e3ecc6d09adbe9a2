//! Post-call feedback models: ratings and reports

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

/// Seeker's rating of a finished conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Great,
    Good,
    Okay,
    Bad,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rating::Great => "great",
            Rating::Good => "good",
            Rating::Okay => "okay",
            Rating::Bad => "bad",
        }
    }

    /// Score the backend uses when averaging listener ratings
    pub fn score(&self) -> u8 {
        match self {
            Rating::Great => 5,
            Rating::Good => 4,
            Rating::Okay => 3,
            Rating::Bad => 1,
        }
    }
}

impl FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "great" => Ok(Rating::Great),
            "good" => Ok(Rating::Good),
            "okay" => Ok(Rating::Okay),
            "bad" => Ok(Rating::Bad),
            other => Err(format!("unknown rating: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct RatingRequest {
    #[validate(length(min = 1, message = "call_id is required"))]
    pub call_id: String,
    pub rating: Rating,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 500))]
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct ReportRequest {
    #[validate(length(min = 1, message = "reported_user_id is required"))]
    pub reported_user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1000))]
    pub details: Option<String>,
}
