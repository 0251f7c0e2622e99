//! Elasticsearch/OpenSearch REST client

use crate::search::backend::{
    BackendIndexStats, BulkItem, BulkOperation, BulkResponse, ClusterInfo, RefreshPolicy,
    SearchBackend,
};
use crate::search::config::SearchConfig;
use crate::search::error::{SearchError, SearchResult};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Index backend talking to a cluster over HTTP
pub struct ElasticsearchClient {
    client: Client,
    base_url: String,
    index: String,
    username: Option<String>,
    password: Option<String>,
    maintenance_timeout: Duration,
}

impl ElasticsearchClient {
    pub fn new(config: &SearchConfig) -> SearchResult<Self> {
        if config.url.trim().is_empty() {
            return Err(SearchError::InvalidConfiguration(
                "search.url must not be empty".to_string(),
            ));
        }
        if config.index.trim().is_empty() {
            return Err(SearchError::InvalidConfiguration(
                "search.index must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SearchError::InvalidConfiguration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            maintenance_timeout: Duration::from_secs(config.maintenance_timeout_secs),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    fn index_path(&self, suffix: &str) -> String {
        format!("/{}{}", self.index, suffix)
    }

    /// Send a request and decode the JSON body, turning non-2xx answers into `Backend` errors
    async fn send(&self, builder: RequestBuilder) -> SearchResult<Value> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(backend_error(status, &body));
        }
        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn by_query(&self, endpoint: &str, body: &Value, counter: &str) -> SearchResult<u64> {
        let path = self.index_path(&format!("/{}?conflicts=proceed&refresh=true", endpoint));
        let response = self
            .send(
                self.request(Method::POST, &path)
                    .timeout(self.maintenance_timeout)
                    .json(body),
            )
            .await?;

        if let Some(failures) = response["failures"].as_array().filter(|f| !f.is_empty()) {
            warn!(
                endpoint = endpoint,
                failures = failures.len(),
                "By-query operation reported failures"
            );
        }
        read_u64(&response, counter)
    }
}

/// Extract `{"error": {"type", "reason"}}` from an error body
fn backend_error(status: StatusCode, body: &str) -> SearchError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let (error_type, reason) = match &parsed["error"] {
        Value::Object(error) => (
            error
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            error
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        ),
        Value::String(reason) => ("error".to_string(), reason.clone()),
        _ => (
            status.canonical_reason().unwrap_or("error").to_string(),
            body.chars().take(512).collect(),
        ),
    };

    SearchError::Backend {
        status: status.as_u16(),
        error_type,
        reason,
    }
}

fn read_u64(response: &Value, field: &str) -> SearchResult<u64> {
    response[field].as_u64().ok_or_else(|| {
        SearchError::MalformedResponse(format!("missing numeric field '{}'", field))
    })
}

/// Render bulk operations as NDJSON
fn bulk_body(index: &str, operations: &[BulkOperation]) -> SearchResult<String> {
    let mut body = String::new();
    for operation in operations {
        match operation {
            BulkOperation::Index { id, document } => {
                body.push_str(&serde_json::to_string(
                    &json!({ "index": { "_index": index, "_id": id } }),
                )?);
                body.push('\n');
                body.push_str(&serde_json::to_string(document)?);
                body.push('\n');
            }
            BulkOperation::Delete { id } => {
                body.push_str(&serde_json::to_string(
                    &json!({ "delete": { "_index": index, "_id": id } }),
                )?);
                body.push('\n');
            }
        }
    }
    Ok(body)
}

/// Parse the `items` array of a bulk response
fn parse_bulk_items(response: &Value) -> SearchResult<Vec<BulkItem>> {
    let items = response["items"].as_array().ok_or_else(|| {
        SearchError::MalformedResponse("bulk response has no items".to_string())
    })?;

    items
        .iter()
        .map(|item| {
            let action = item
                .as_object()
                .and_then(|object| object.values().next())
                .ok_or_else(|| {
                    SearchError::MalformedResponse("empty bulk item".to_string())
                })?;

            let error = match &action["error"] {
                Value::Null => None,
                Value::Object(error) => Some(format!(
                    "{}: {}",
                    error.get("type").and_then(Value::as_str).unwrap_or("error"),
                    error.get("reason").and_then(Value::as_str).unwrap_or_default()
                )),
                other => Some(other.to_string()),
            };

            Ok(BulkItem {
                id: action["_id"].as_str().unwrap_or_default().to_string(),
                status: action["status"].as_u64().unwrap_or(0) as u16,
                error,
            })
        })
        .collect()
}

#[async_trait]
impl SearchBackend for ElasticsearchClient {
    fn index_name(&self) -> &str {
        &self.index
    }

    async fn index_exists(&self) -> SearchResult<bool> {
        let response = self
            .request(Method::HEAD, &self.index_path(""))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(backend_error(status, "")),
        }
    }

    async fn create_index(&self, definition: &Value) -> SearchResult<()> {
        let result = self
            .send(
                self.request(Method::PUT, &self.index_path(""))
                    .json(definition),
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            // Another instance won the race
            Err(SearchError::Backend { error_type, .. })
                if error_type == "resource_already_exists_exception" =>
            {
                debug!(index = %self.index, "Index created concurrently");
                Ok(())
            }
            Err(e) => Err(SearchError::IndexInitFailed(e.to_string())),
        }
    }

    async fn put_document(
        &self,
        id: &str,
        document: &Value,
        refresh: RefreshPolicy,
    ) -> SearchResult<()> {
        let path = self.index_path(&format!("/_doc/{}?refresh={}", id, refresh.as_str()));
        self.send(self.request(Method::PUT, &path).json(document))
            .await?;
        Ok(())
    }

    async fn update_document(
        &self,
        id: &str,
        partial: &Value,
        refresh: RefreshPolicy,
    ) -> SearchResult<()> {
        let path = self.index_path(&format!("/_update/{}?refresh={}", id, refresh.as_str()));
        match self
            .send(
                self.request(Method::POST, &path)
                    .json(&json!({ "doc": partial })),
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(SearchError::Backend { status: 404, .. }) => {
                Err(SearchError::NotFound(format!("message {}", id)))
            }
            Err(e) => Err(e),
        }
    }

    async fn bulk(
        &self,
        operations: Vec<BulkOperation>,
        refresh: RefreshPolicy,
    ) -> SearchResult<BulkResponse> {
        if operations.is_empty() {
            return Ok(BulkResponse::default());
        }

        let body = bulk_body(&self.index, &operations)?;
        let response = self
            .send(
                self.request(Method::POST, &format!("/_bulk?refresh={}", refresh.as_str()))
                    .header("Content-Type", "application/x-ndjson")
                    .body(body),
            )
            .await?;

        let items = parse_bulk_items(&response)?;
        if items.len() != operations.len() {
            return Err(SearchError::MalformedResponse(format!(
                "bulk response has {} items for {} operations",
                items.len(),
                operations.len()
            )));
        }

        Ok(BulkResponse {
            items,
            took_ms: response["took"].as_u64().unwrap_or(0),
        })
    }

    async fn search(&self, body: &Value) -> SearchResult<Value> {
        self.send(
            self.request(Method::POST, &self.index_path("/_search"))
                .json(body),
        )
        .await
        .map_err(|e| match e {
            SearchError::Backend { .. } => SearchError::SearchFailed(e.to_string()),
            other => other,
        })
    }

    async fn count(&self, body: &Value) -> SearchResult<u64> {
        let response = self
            .send(
                self.request(Method::POST, &self.index_path("/_count"))
                    .json(body),
            )
            .await?;
        read_u64(&response, "count")
    }

    async fn update_by_query(&self, body: &Value) -> SearchResult<u64> {
        self.by_query("_update_by_query", body, "updated").await
    }

    async fn delete_by_query(&self, body: &Value) -> SearchResult<u64> {
        self.by_query("_delete_by_query", body, "deleted").await
    }

    async fn index_stats(&self) -> SearchResult<BackendIndexStats> {
        // _stats docs.count includes nested entity documents, so count top-level ones separately
        let document_count = self.count(&json!({ "query": { "match_all": {} } })).await?;
        let stats = self
            .send(self.request(Method::GET, &self.index_path("/_stats/store")))
            .await?;

        Ok(BackendIndexStats {
            document_count,
            store_size_bytes: stats["_all"]["primaries"]["store"]["size_in_bytes"]
                .as_u64()
                .unwrap_or(0),
        })
    }

    async fn cluster_info(&self) -> SearchResult<ClusterInfo> {
        let info = self.send(self.request(Method::GET, "/")).await?;
        let version = &info["version"];

        Ok(ClusterInfo {
            engine: version["distribution"]
                .as_str()
                .unwrap_or("elasticsearch")
                .to_string(),
            version: version["number"].as_str().unwrap_or("unknown").to_string(),
        })
    }
}
