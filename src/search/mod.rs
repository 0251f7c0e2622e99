//! CJK-aware message search on top of an Elasticsearch-compatible index
//!
//! - **Schema**: a bigram analyzer for fuzzy CJK matching plus `exact`
//!   sub-fields (keyword tokenizer, lowercased) for whole-value matching
//! - **Ingestion**: idempotent upserts keyed by `"{chatID}-{messageID}"` and
//!   bulk writes that report per-document failures
//! - **Queries**: keyword + filter requests compiled to a boolean query,
//!   sorted newest first and paginated
//! - **Maintenance**: soft-delete by message/chat/user, index clear and a
//!   resumable deduplication sweep
//! - **Statistics**: per-user activity and mention counts
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │ SearchService   MaintenanceService   StatsService     │
//! │        │                │                  │          │
//! │        └──── QueryBuilder (SchemaGeneration) ┘        │
//! └───────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌───────────────────────────────────────────────────────┐
//! │ SearchBackend                                          │
//! │   ElasticsearchClient (REST)   InMemoryBackend (tests) │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use chat_archive_search::models::SearchRequest;
//! use chat_archive_search::search::{SearchConfig, SearchService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let search = SearchService::connect(SearchConfig::default()).await?;
//!
//!     let request = SearchRequest::new("你好").in_chat(-1001234567890);
//!     let page = search.search(&request).await?;
//!     println!("Found {} messages", page.total_hits);
//!
//!     Ok(())
//! }
//! ```

mod backend;
mod config;
mod dedup;
mod document;
mod elasticsearch;
mod error;
mod index;
mod maintenance;
mod memory;
mod query;
mod schema;
mod service;
mod stats;

pub use backend::{
    create_backend, create_in_memory_backend, BackendIndexStats, BulkItem, BulkOperation,
    BulkResponse, ClusterInfo, RefreshPolicy, SearchBackend,
};
pub use config::{BackendKind, SearchConfig, SearchConfigBuilder};
pub use dedup::{DuplicateGroup, DuplicateSweep};
pub use document::{message_from_source, SearchDocument};
pub use elasticsearch::ElasticsearchClient;
pub use error::{SearchError, SearchResult};
pub use index::IndexManager;
pub use maintenance::{soft_delete_fields, MaintenanceService, SET_FIELDS_SCRIPT};
pub use memory::{bigram_tokens, exact_token, InMemoryBackend};
pub use query::{normalize_username, QueryBuilder};
pub use schema::{fields, index_definition, MirroredField, SchemaGeneration};
pub use service::{parse_hits, SearchService};
pub use stats::StatsService;
