//! Cursor-driven scan for documents sharing a `(chatID, messageID)` pair

use crate::search::backend::SearchBackend;
use crate::search::error::{SearchError, SearchResult};
use crate::search::schema::fields;
use futures::stream::{self, Stream};
use serde_json::{json, Value};
use std::sync::Arc;

const AGGREGATION: &str = "duplicates";
const LATEST: &str = "latest";

/// Copies of one message; `keep` is the most recent by timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub chat_id: i64,
    pub message_id: i64,
    /// Number of documents in the group
    pub total: u64,
    pub keep: String,
    /// Older copies returned with this page
    pub remove: Vec<String>,
}

impl DuplicateGroup {
    /// Copies beyond the one kept
    pub fn surplus(&self) -> u64 {
        self.total.saturating_sub(1)
    }

    /// More copies exist than the page returned; a later sweep picks them up
    pub fn is_truncated(&self) -> bool {
        (self.remove.len() as u64) < self.surplus()
    }
}

/// Lazy sequence of composite aggregation pages.
///
/// Each call to [`next_page`](Self::next_page) fetches one page of
/// `(chatID, messageID)` buckets after the current cursor and yields the
/// groups holding more than one document. The cursor can be read back with
/// [`after_key`](Self::after_key) and handed to
/// [`resume_from`](Self::resume_from) to continue an interrupted sweep.
pub struct DuplicateSweep {
    backend: Arc<dyn SearchBackend>,
    page_size: usize,
    top_hits: usize,
    after_key: Option<Value>,
    exhausted: bool,
}

impl DuplicateSweep {
    pub fn new(backend: Arc<dyn SearchBackend>, page_size: usize, top_hits: usize) -> Self {
        Self {
            backend,
            page_size: page_size.max(1),
            top_hits: top_hits.max(2),
            after_key: None,
            exhausted: false,
        }
    }

    /// Continue after a previously returned cursor
    pub fn resume_from(mut self, after_key: Value) -> Self {
        self.after_key = Some(after_key);
        self
    }

    pub fn after_key(&self) -> Option<&Value> {
        self.after_key.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn request_body(&self) -> Value {
        let mut composite = json!({
            "size": self.page_size,
            "sources": [
                { "chat": { "terms": { "field": fields::CHAT_ID } } },
                { "message": { "terms": { "field": fields::MESSAGE_ID } } }
            ]
        });
        if let Some(after) = &self.after_key {
            composite["after"] = after.clone();
        }

        json!({
            "size": 0,
            "query": { "match_all": {} },
            "aggs": {
                AGGREGATION: {
                    "composite": composite,
                    "aggs": {
                        LATEST: {
                            "top_hits": {
                                "size": self.top_hits,
                                "sort": [{ fields::TIMESTAMP: { "order": "desc" } }],
                                "_source": [fields::TIMESTAMP]
                            }
                        }
                    }
                }
            }
        })
    }

    /// Fetch the next page; `None` once every bucket has been visited.
    ///
    /// A page without duplicates yields an empty vector.
    pub async fn next_page(&mut self) -> SearchResult<Option<Vec<DuplicateGroup>>> {
        if self.exhausted {
            return Ok(None);
        }

        let response = self.backend.search(&self.request_body()).await?;
        let aggregation = &response["aggregations"][AGGREGATION];
        let buckets = aggregation["buckets"].as_array().ok_or_else(|| {
            SearchError::MalformedResponse("composite aggregation has no buckets".to_string())
        })?;

        if buckets.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }

        let mut groups = Vec::new();
        for bucket in buckets {
            if let Some(group) = parse_group(bucket)? {
                groups.push(group);
            }
        }

        match aggregation.get("after_key").filter(|key| !key.is_null()) {
            Some(after_key) => self.after_key = Some(after_key.clone()),
            None => self.exhausted = true,
        }
        if buckets.len() < self.page_size {
            self.exhausted = true;
        }

        Ok(Some(groups))
    }

    /// The sweep as a stream of pages
    pub fn into_stream(self) -> impl Stream<Item = SearchResult<Vec<DuplicateGroup>>> {
        stream::try_unfold(self, |mut sweep| async move {
            Ok(sweep.next_page().await?.map(|groups| (groups, sweep)))
        })
    }
}

fn parse_group(bucket: &Value) -> SearchResult<Option<DuplicateGroup>> {
    let total = bucket["doc_count"].as_u64().unwrap_or(0);
    if total < 2 {
        return Ok(None);
    }

    let key = &bucket["key"];
    let (chat_id, message_id) = match (key["chat"].as_i64(), key["message"].as_i64()) {
        (Some(chat), Some(message)) => (chat, message),
        _ => {
            return Err(SearchError::MalformedResponse(format!(
                "unexpected composite key {}",
                key
            )))
        }
    };

    let mut ids = bucket[LATEST]["hits"]["hits"]
        .as_array()
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| hit["_id"].as_str().map(str::to_string))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default()
        .into_iter();

    let keep = ids.next().ok_or_else(|| {
        SearchError::MalformedResponse(format!(
            "group {}-{} returned no documents",
            chat_id, message_id
        ))
    })?;

    Ok(Some(DuplicateGroup {
        chat_id,
        message_id,
        total,
        keep,
        remove: ids.collect(),
    }))
}
