//! Search index management

use crate::models::IndexStatsResponse;
use crate::search::backend::{ClusterInfo, SearchBackend};
use crate::search::config::SearchConfig;
use crate::search::error::SearchResult;
use crate::search::query::QueryBuilder;
use crate::search::schema::{fields, index_definition};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Provisions the message index and reports on it
pub struct IndexManager {
    backend: Arc<dyn SearchBackend>,
    config: SearchConfig,
}

impl IndexManager {
    pub fn new(backend: Arc<dyn SearchBackend>, config: SearchConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        &self.backend
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Create the index with its analyzers and mappings unless it already exists.
    ///
    /// Returns whether the index was created by this call.
    pub async fn ensure_index(&self) -> SearchResult<bool> {
        if self.backend.index_exists().await? {
            info!(index = %self.backend.index_name(), "Search index already exists");
            return Ok(false);
        }

        self.backend
            .create_index(&index_definition(&self.config))
            .await?;
        info!(
            index = %self.backend.index_name(),
            shards = self.config.number_of_shards,
            replicas = self.config.number_of_replicas,
            "Created search index"
        );
        Ok(true)
    }

    /// Number of top-level message documents, deleted ones included
    pub async fn total_documents(&self) -> SearchResult<u64> {
        self.backend
            .count(&json!({ "query": { "match_all": {} } }))
            .await
    }

    pub async fn cluster_info(&self) -> SearchResult<ClusterInfo> {
        self.backend.cluster_info().await
    }

    /// Aggregate statistics of the message index
    pub async fn get_stats(&self) -> SearchResult<IndexStatsResponse> {
        let physical = self.backend.index_stats().await?;
        let soft_deleted = self
            .backend
            .count(&json!({ "query": QueryBuilder::deleted_marker() }))
            .await?;

        let response = self
            .backend
            .search(&json!({
                "size": 0,
                "track_total_hits": true,
                "query": { "match_all": {} },
                "aggs": {
                    "distinct_chats": { "cardinality": { "field": fields::CHAT_ID } },
                    "distinct_senders": { "cardinality": { "field": fields::SENDER_ID } },
                    "oldest": { "min": { "field": fields::TIMESTAMP } },
                    "newest": { "max": { "field": fields::TIMESTAMP } }
                }
            }))
            .await?;
        let aggs = &response["aggregations"];

        Ok(IndexStatsResponse {
            index: self.backend.index_name().to_string(),
            total_documents: physical.document_count,
            soft_deleted_documents: soft_deleted,
            store_size_bytes: physical.store_size_bytes,
            distinct_chats: aggs["distinct_chats"]["value"].as_u64().unwrap_or(0),
            distinct_senders: aggs["distinct_senders"]["value"].as_u64().unwrap_or(0),
            oldest_timestamp: epoch_value(&aggs["oldest"]["value"]),
            newest_timestamp: epoch_value(&aggs["newest"]["value"]),
        })
    }
}

/// min/max on a date field come back as epoch milliseconds in a float
fn epoch_value(value: &Value) -> Option<i64> {
    value.as_f64().map(|v| {
        let v = v as i64;
        if v > 100_000_000_000 {
            v / 1000
        } else {
            v
        }
    })
}
