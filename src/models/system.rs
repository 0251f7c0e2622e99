use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unauthenticated liveness probe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}

/// Unauthenticated service banner served on `/`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfoResponse {
    pub service: String,
    pub version: String,
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub status: String,
    pub engine: String,
    pub version: String,
    pub total_documents: u64,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub service: String,
    /// `ok`, or `degraded` when the index is unreachable
    pub status: String,
    pub hostname: String,
    pub uptime_seconds: u64,
    pub message_index_total: u64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate statistics of the message index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatsResponse {
    pub index: String,
    pub total_documents: u64,
    pub soft_deleted_documents: u64,
    pub store_size_bytes: u64,
    pub distinct_chats: u64,
    pub distinct_senders: u64,
    /// Oldest indexed message, unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_timestamp: Option<i64>,
    /// Newest indexed message, unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newest_timestamp: Option<i64>,
}
