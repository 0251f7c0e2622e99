use crate::models::Message;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Structured query issued by the search front-end
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Keyword; empty means filter-only browsing
    #[serde(default)]
    #[validate(length(max = 1024))]
    pub query: String,

    /// Phrase-match on the exact sub-field instead of bigram matching
    #[serde(default)]
    pub exact_match: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_type: Option<String>,

    /// Sender username, with or without the leading `@`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, rename = "chatID", skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<i64>,

    #[serde(default, rename = "blockedUserIDs")]
    pub blocked_user_ids: Vec<i64>,

    /// Inclusive lower bound, unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_timestamp: Option<i64>,

    /// Inclusive upper bound, unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_timestamp: Option<i64>,

    #[serde(default)]
    pub include_deleted: bool,

    /// 1-based
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "page starts at 1"))]
    pub page: u32,

    #[serde(default = "default_page_size", alias = "hitsPerPage")]
    #[validate(range(min = 1, message = "pageSize must be positive"))]
    pub page_size: u32,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page: default_page(),
            page_size: default_page_size(),
            ..Default::default()
        }
    }

    pub fn exact(mut self) -> Self {
        self.exact_match = true;
        self
    }

    pub fn in_chat(mut self, chat_id: i64) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_chat_type(mut self, chat_type: impl Into<String>) -> Self {
        self.chat_type = Some(chat_type.into());
        self
    }

    pub fn blocking(mut self, user_ids: Vec<i64>) -> Self {
        self.blocked_user_ids = user_ids;
        self
    }

    pub fn with_page(mut self, page: u32, page_size: u32) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    /// Zero-based offset of the first hit on the requested page
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

/// One matching message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub message: Message,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// What the query engine returns before the boundary stamps latency on it
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    pub total_hits: u64,
    pub page: u32,
    pub page_size: u32,
}

impl SearchPage {
    pub fn total_pages(&self) -> u64 {
        total_pages(self.total_hits, self.page_size)
    }
}

/// `ceil(total_hits / page_size)`, 0 for an empty page size
pub fn total_pages(total_hits: u64, page_size: u32) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total_hits.div_ceil(u64::from(page_size))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub total_hits: u64,
    pub total_pages: u64,
    pub page: u32,
    pub hits_per_page: u32,
    pub took_ms: u64,
}

impl SearchResponse {
    pub fn from_page(page: SearchPage, took_ms: u64) -> Self {
        Self {
            total_pages: page.total_pages(),
            hits: page.hits,
            total_hits: page.total_hits,
            page: page.page,
            hits_per_page: page.page_size,
            took_ms,
        }
    }
}
