//! Index backend abstraction
//!
//! Everything above this trait speaks the Elasticsearch query DSL as
//! `serde_json::Value`; implementations either ship it over HTTP or evaluate it
//! in process.

use crate::search::config::{BackendKind, SearchConfig};
use crate::search::elasticsearch::ElasticsearchClient;
use crate::search::error::SearchResult;
use crate::search::memory::InMemoryBackend;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// When written documents become visible to search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefreshPolicy {
    /// Visible after the next periodic refresh
    #[default]
    #[serde(rename = "false")]
    False,
    /// Block until a refresh makes the write visible
    #[serde(rename = "wait_for")]
    WaitFor,
    /// Force a refresh immediately
    #[serde(rename = "true")]
    True,
}

impl RefreshPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshPolicy::False => "false",
            RefreshPolicy::WaitFor => "wait_for",
            RefreshPolicy::True => "true",
        }
    }
}

/// One action inside a bulk request
#[derive(Debug, Clone)]
pub enum BulkOperation {
    Index { id: String, document: Value },
    Delete { id: String },
}

impl BulkOperation {
    pub fn id(&self) -> &str {
        match self {
            BulkOperation::Index { id, .. } | BulkOperation::Delete { id } => id,
        }
    }
}

/// Outcome of one bulk action
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    pub id: String,
    pub status: u16,
    pub error: Option<String>,
}

impl BulkItem {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

/// Per-item results of a bulk request, in request order
#[derive(Debug, Clone, Default)]
pub struct BulkResponse {
    pub items: Vec<BulkItem>,
    pub took_ms: u64,
}

impl BulkResponse {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.succeeded()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &BulkItem> {
        self.items.iter().filter(|item| !item.succeeded())
    }
}

/// Physical size of the index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendIndexStats {
    pub document_count: u64,
    pub store_size_bytes: u64,
}

/// Identity of the cluster serving the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub engine: String,
    pub version: String,
}

/// Operations the service layer needs from a search index
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Name of the index every call targets
    fn index_name(&self) -> &str;

    async fn index_exists(&self) -> SearchResult<bool>;

    /// Create the index; an index that already exists is not an error
    async fn create_index(&self, definition: &Value) -> SearchResult<()>;

    /// Create or fully replace a document
    async fn put_document(
        &self,
        id: &str,
        document: &Value,
        refresh: RefreshPolicy,
    ) -> SearchResult<()>;

    /// Merge `partial` into an existing document; `NotFound` when the id is unknown
    async fn update_document(
        &self,
        id: &str,
        partial: &Value,
        refresh: RefreshPolicy,
    ) -> SearchResult<()>;

    async fn bulk(
        &self,
        operations: Vec<BulkOperation>,
        refresh: RefreshPolicy,
    ) -> SearchResult<BulkResponse>;

    /// Run a `_search` body and return the raw response
    async fn search(&self, body: &Value) -> SearchResult<Value>;

    /// Count documents matching a `{"query": ...}` body
    async fn count(&self, body: &Value) -> SearchResult<u64>;

    /// Run `_update_by_query`, returning the number of updated documents
    async fn update_by_query(&self, body: &Value) -> SearchResult<u64>;

    /// Run `_delete_by_query`, returning the number of deleted documents
    async fn delete_by_query(&self, body: &Value) -> SearchResult<u64>;

    async fn index_stats(&self) -> SearchResult<BackendIndexStats>;

    async fn cluster_info(&self) -> SearchResult<ClusterInfo>;
}

/// Create a search backend based on configuration
pub fn create_backend(config: &SearchConfig) -> SearchResult<Arc<dyn SearchBackend>> {
    match config.backend {
        BackendKind::Elasticsearch => {
            tracing::info!(url = %config.url, index = %config.index, "Initializing Elasticsearch backend");
            Ok(Arc::new(ElasticsearchClient::new(config)?))
        }
        BackendKind::InMemory => Ok(create_in_memory_backend(&config.index)),
    }
}

/// Create a process-local backend (for testing and development)
pub fn create_in_memory_backend(index: &str) -> Arc<dyn SearchBackend> {
    tracing::info!(index = %index, "Initializing in-memory search backend");
    Arc::new(InMemoryBackend::new(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_policy_wire_names() {
        assert_eq!(RefreshPolicy::WaitFor.as_str(), "wait_for");
        let parsed: RefreshPolicy = serde_json::from_str("\"true\"").unwrap();
        assert_eq!(parsed, RefreshPolicy::True);
        assert_eq!(RefreshPolicy::default(), RefreshPolicy::False);
    }

    #[test]
    fn test_bulk_response_counts() {
        let response = BulkResponse {
            items: vec![
                BulkItem {
                    id: "1-1".to_string(),
                    status: 201,
                    error: None,
                },
                BulkItem {
                    id: "1-2".to_string(),
                    status: 400,
                    error: Some("mapper_parsing_exception".to_string()),
                },
                BulkItem {
                    id: "1-3".to_string(),
                    status: 404,
                    error: None,
                },
            ],
            took_ms: 3,
        };
        assert_eq!(response.succeeded(), 1);
        assert_eq!(response.failures().count(), 2);
    }

    #[tokio::test]
    async fn test_create_in_memory_backend_from_config() {
        let config = SearchConfig {
            backend: BackendKind::InMemory,
            index: "test_messages".to_string(),
            ..Default::default()
        };
        let backend = create_backend(&config).unwrap();
        assert_eq!(backend.index_name(), "test_messages");
        assert!(!backend.index_exists().await.unwrap());
    }
}
