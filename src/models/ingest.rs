use crate::models::Message;
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertResponse {
    pub success: bool,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BatchUpsertRequest {
    #[validate(length(min = 1, message = "batch must contain at least one message"))]
    pub messages: Vec<Message>,
}

/// Outcome of a bulk write; a partial failure is still a successful call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUpsertResponse {
    pub success: bool,
    pub indexed_count: usize,
    pub failed_count: usize,
    /// One entry per failed document, `"{id}: {reason}"`
    #[serde(default)]
    pub errors: Vec<String>,
}
