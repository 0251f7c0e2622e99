//! # chat-archive-search
//!
//! Indexing and query engine for chat archives with CJK-aware full-text search.
//!
//! Upstream collectors push normalized messages through an authenticated
//! JSON/HTTP API; the engine persists them in an Elasticsearch-compatible
//! index and serves filtered search, soft-deletion, deduplication and
//! per-user activity statistics.

#![recursion_limit = "256"]

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod search;

pub use error::{AppError, Result};
