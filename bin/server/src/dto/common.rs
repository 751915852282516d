use serde::{Deserialize, Serialize};

/// Common result structure for failed operations
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResult {
    pub message: String,
    pub success: bool,
}

impl ApiResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: false,
        }
    }
}
