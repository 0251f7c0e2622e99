//! Search configuration

use crate::search::backend::RefreshPolicy;
use crate::search::schema::SchemaGeneration;
use serde::{Deserialize, Serialize};

/// Which index implementation backs the service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Elasticsearch/OpenSearch REST API
    #[default]
    Elasticsearch,
    /// Process-local index (for development and testing)
    InMemory,
}

/// Search service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Index implementation
    #[serde(default)]
    pub backend: BackendKind,

    /// Base URL of the cluster
    #[serde(default = "default_url")]
    pub url: String,

    /// Index name; bump the suffix for a new schema generation
    #[serde(default = "default_index")]
    pub index: String,

    /// Basic-auth user
    #[serde(default)]
    pub username: Option<String>,

    /// Basic-auth password
    #[serde(default)]
    pub password: Option<String>,

    /// Primary shards for a freshly created index
    #[serde(default = "default_shards")]
    pub number_of_shards: u32,

    /// Replicas for a freshly created index
    #[serde(default)]
    pub number_of_replicas: u32,

    /// Refresh policy applied to writes
    #[serde(default)]
    pub refresh: RefreshPolicy,

    /// Field-path layout emitted by the query builder and document writer
    #[serde(default)]
    pub schema_generation: SchemaGeneration,

    /// Timeout for ordinary index calls (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for by-query maintenance calls (seconds)
    #[serde(default = "default_maintenance_timeout")]
    pub maintenance_timeout_secs: u64,

    /// Composite aggregation buckets fetched per dedup page
    #[serde(default = "default_dedup_page_size")]
    pub dedup_page_size: usize,

    /// Copies fetched per duplicate group
    #[serde(default = "default_dedup_top_hits")]
    pub dedup_top_hits: usize,

    /// Upper bound for `from + size` in paginated searches
    #[serde(default = "default_max_result_window")]
    pub max_result_window: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            url: default_url(),
            index: default_index(),
            username: None,
            password: None,
            number_of_shards: default_shards(),
            number_of_replicas: 0,
            refresh: RefreshPolicy::default(),
            schema_generation: SchemaGeneration::default(),
            request_timeout_secs: default_request_timeout(),
            maintenance_timeout_secs: default_maintenance_timeout(),
            dedup_page_size: default_dedup_page_size(),
            dedup_top_hits: default_dedup_top_hits(),
            max_result_window: default_max_result_window(),
        }
    }
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_index() -> String {
    "chat_messages_v1".to_string()
}

fn default_shards() -> u32 {
    1
}

fn default_request_timeout() -> u64 {
    30
}

fn default_maintenance_timeout() -> u64 {
    600
}

fn default_dedup_page_size() -> usize {
    500
}

fn default_dedup_top_hits() -> usize {
    100
}

fn default_max_result_window() -> u64 {
    10_000
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.config.url = url.into();
        self
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.config.index = index.into();
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    pub fn refresh(mut self, refresh: RefreshPolicy) -> Self {
        self.config.refresh = refresh;
        self
    }

    pub fn schema_generation(mut self, generation: SchemaGeneration) -> Self {
        self.config.schema_generation = generation;
        self
    }

    pub fn dedup_page_size(mut self, size: usize) -> Self {
        self.config.dedup_page_size = size;
        self
    }

    pub fn dedup_top_hits(mut self, size: usize) -> Self {
        self.config.dedup_top_hits = size;
        self
    }

    pub fn max_result_window(mut self, window: u64) -> Self {
        self.config.max_result_window = window;
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
