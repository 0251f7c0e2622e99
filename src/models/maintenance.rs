use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SoftDeleteRequest {
    #[serde(rename = "chatID")]
    pub chat_id: i64,

    #[serde(rename = "messageID")]
    pub message_id: i64,
}

/// Query string of `DELETE /api/v1/messages`
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteByChatQuery {
    pub chat_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    pub deleted_count: u64,
}

/// Result of one deduplication sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupReport {
    /// Groups that held more than one copy
    pub groups: u64,
    /// Non-canonical copies detected
    pub duplicates_found: u64,
    /// Non-canonical copies actually deleted
    pub duplicates_removed: u64,
    /// Per-document delete failures
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupResponse {
    pub success: bool,
    pub duplicates_found: u64,
    pub duplicates_removed: u64,
    pub message: String,
}

impl From<DedupReport> for DedupResponse {
    fn from(report: DedupReport) -> Self {
        let message = if report.duplicates_found == 0 {
            "no duplicates found".to_string()
        } else if report.errors.is_empty() {
            format!(
                "removed {} duplicates across {} groups",
                report.duplicates_removed, report.groups
            )
        } else {
            format!(
                "removed {} of {} duplicates across {} groups; {} removals failed, re-run to retry",
                report.duplicates_removed,
                report.duplicates_found,
                report.groups,
                report.errors.len()
            )
        };

        Self {
            success: true,
            duplicates_found: report.duplicates_found,
            duplicates_removed: report.duplicates_removed,
            message,
        }
    }
}
