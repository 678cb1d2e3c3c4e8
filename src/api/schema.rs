use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body returned by every failing endpoint
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// What went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl ToString) -> Self {
        ErrorResponse {
            error: error.to_string(),
        }
    }
}

/// Plain acknowledgement body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl ToString) -> Self {
        MessageResponse {
            message: message.to_string(),
        }
    }
}
