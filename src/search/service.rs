//! Ingestion and query service

use crate::metrics;
use crate::models::{BatchUpsertResponse, Message, SearchHit, SearchPage, SearchRequest};
use crate::search::backend::{create_backend, BulkOperation, SearchBackend};
use crate::search::config::SearchConfig;
use crate::search::document::{message_from_source, SearchDocument};
use crate::search::error::{SearchError, SearchResult};
use crate::search::index::IndexManager;
use crate::search::query::QueryBuilder;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use validator::Validate;

/// Writes messages into the index and answers search requests
pub struct SearchService {
    index_manager: Arc<IndexManager>,
    queries: QueryBuilder,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(backend: Arc<dyn SearchBackend>, config: SearchConfig) -> Self {
        let queries = QueryBuilder::new(config.schema_generation, config.max_result_window);
        Self {
            index_manager: Arc::new(IndexManager::new(backend, config.clone())),
            queries,
            config,
        }
    }

    /// Build the configured backend and provision the index
    pub async fn connect(config: SearchConfig) -> SearchResult<Self> {
        let backend = create_backend(&config)?;
        let service = Self::new(backend, config);
        service.index_manager.ensure_index().await?;
        Ok(service)
    }

    pub fn index_manager(&self) -> &Arc<IndexManager> {
        &self.index_manager
    }

    pub fn backend(&self) -> &Arc<dyn SearchBackend> {
        self.index_manager.backend()
    }

    pub fn queries(&self) -> QueryBuilder {
        self.queries
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Reject a message before it reaches storage
    fn check_message(message: &Message) -> SearchResult<()> {
        message
            .validate()
            .map_err(|e| SearchError::InvalidRequest(format!("message {:?}: {}", message.id, e)))?;
        message
            .check_consistency()
            .map_err(SearchError::InvalidRequest)
    }

    /// Create or overwrite one message, keyed by its composite id
    pub async fn upsert(&self, message: &Message) -> SearchResult<String> {
        Self::check_message(message)?;

        let id = message.document_id();
        let source = message.to_source(self.config.schema_generation)?;
        let result = self
            .backend()
            .put_document(&id, &source, self.config.refresh)
            .await;

        match result {
            Ok(()) => {
                metrics::record_ingest(1, 0);
                debug!(id = %id, chat_id = message.chat_id, message_id = message.message_id, "Upserted message");
                Ok(id)
            }
            Err(e) => {
                metrics::record_ingest(0, 1);
                Err(e)
            }
        }
    }

    /// Write many messages in one bulk call.
    ///
    /// The whole batch is validated first; after that, per-document failures
    /// are reported in the response instead of failing the call.
    pub async fn batch_upsert(&self, messages: &[Message]) -> SearchResult<BatchUpsertResponse> {
        if messages.is_empty() {
            return Err(SearchError::InvalidRequest(
                "batch must contain at least one message".to_string(),
            ));
        }
        for message in messages {
            Self::check_message(message)?;
        }

        let mut operations = Vec::with_capacity(messages.len());
        for message in messages {
            operations.push(BulkOperation::Index {
                id: message.document_id(),
                document: message.to_source(self.config.schema_generation)?,
            });
        }

        let response = self.backend().bulk(operations, self.config.refresh).await?;
        let errors: Vec<String> = response
            .failures()
            .map(|item| {
                format!(
                    "{}: {}",
                    item.id,
                    item.error.as_deref().unwrap_or("rejected by index")
                )
            })
            .collect();
        let indexed = response.succeeded();
        let failed = errors.len();

        metrics::record_ingest(indexed, failed);
        if failed > 0 {
            warn!(indexed = indexed, failed = failed, "Batch upsert partially failed");
        } else {
            info!(indexed = indexed, took_ms = response.took_ms, "Batch upsert completed");
        }

        Ok(BatchUpsertResponse {
            success: true,
            indexed_count: indexed,
            failed_count: failed,
            errors,
        })
    }

    /// Run a search request and return one page of hits
    pub async fn search(&self, request: &SearchRequest) -> SearchResult<SearchPage> {
        let body = self.queries.search_body(request)?;
        let start = Instant::now();
        let response = self.backend().search(&body).await?;
        metrics::SEARCH_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());

        let (hits, total_hits) = parse_hits(&response)?;
        debug!(
            query = %request.query,
            exact = request.exact_match,
            total_hits = total_hits,
            "Search executed"
        );

        Ok(SearchPage {
            hits,
            total_hits,
            page: request.page,
            page_size: request.page_size,
        })
    }
}

/// Decode `hits.hits[]` into typed hits plus the exact total.
///
/// Stored documents that no longer decode are logged and left out of the page.
pub fn parse_hits(response: &Value) -> SearchResult<(Vec<SearchHit>, u64)> {
    let hits = &response["hits"];
    let total = match &hits["total"] {
        Value::Object(total) => total.get("value").and_then(Value::as_u64),
        other => other.as_u64(),
    }
    .ok_or_else(|| SearchError::MalformedResponse("missing hits.total".to_string()))?;

    let raw_hits = hits["hits"]
        .as_array()
        .ok_or_else(|| SearchError::MalformedResponse("missing hits.hits".to_string()))?;

    let mut parsed = Vec::with_capacity(raw_hits.len());
    for hit in raw_hits {
        let id = hit["_id"].as_str().unwrap_or_default();
        match message_from_source(id, &hit["_source"]) {
            Ok(message) => parsed.push(SearchHit {
                message,
                score: hit["_score"].as_f64(),
            }),
            Err(e) => warn!(id = %id, error = %e, "Skipping undecodable search hit"),
        }
    }
    Ok((parsed, total))
}
