use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Activity of one user inside one group over `[from, to]`
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_window"))]
pub struct UserStatsRequest {
    #[serde(rename = "groupID")]
    pub group_id: i64,

    #[serde(rename = "userID")]
    pub user_id: i64,

    /// Inclusive, unix seconds
    pub from: i64,

    /// Inclusive, unix seconds
    pub to: i64,

    #[serde(default)]
    pub include_mentions: bool,

    #[serde(default)]
    pub include_deleted: bool,
}

fn validate_window(request: &UserStatsRequest) -> Result<(), ValidationError> {
    if request.from > request.to {
        let mut error = ValidationError::new("window");
        error.message = Some("`from` must not be after `to`".into());
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatsResponse {
    #[serde(rename = "groupID")]
    pub group_id: i64,

    #[serde(rename = "userID")]
    pub user_id: i64,

    pub from: i64,

    pub to: i64,

    pub user_message_count: u64,

    pub group_message_count: u64,

    /// `user / group`, 0 when the group is silent
    pub ratio: f64,

    /// Messages by the user that mention someone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentions_out: Option<u64>,

    /// Messages by others that mention the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentions_in: Option<u64>,

    /// Set when a mention count was zero-filled after a failure
    #[serde(default)]
    pub mentions_partial: bool,
}

pub fn activity_ratio(user_count: u64, group_count: u64) -> f64 {
    if group_count == 0 {
        0.0
    } else {
        user_count as f64 / group_count as f64
    }
}
