//! Listener presence models

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ToggleOnlineRequest {
    pub online: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToggleOnlineResponse {
    #[serde(default)]
    pub success: bool,
    pub online: bool,
}
