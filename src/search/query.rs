//! Query DSL construction

use crate::models::SearchRequest;
use crate::search::error::{SearchError, SearchResult};
use crate::search::schema::{fields, MirroredField, SchemaGeneration};
use serde_json::{json, Value};

/// Fields searched by the keyword clause
pub const BODY_FIELDS: [&str; 2] = [fields::TEXT, fields::CAPTION];

/// Exact sub-fields searched when `exactMatch` is set
pub const EXACT_BODY_FIELDS: [&str; 2] = [fields::TEXT_EXACT, fields::CAPTION_EXACT];

/// Strip whitespace and a leading `@`; `None` when nothing is left
pub fn normalize_username(username: &str) -> Option<String> {
    let trimmed = username.trim();
    let stripped = trimmed.strip_prefix('@').unwrap_or(trimmed).trim();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// Builds request bodies for the configured schema generation
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    generation: SchemaGeneration,
    max_result_window: u64,
}

impl QueryBuilder {
    pub fn new(generation: SchemaGeneration, max_result_window: u64) -> Self {
        Self {
            generation,
            max_result_window,
        }
    }

    pub fn generation(&self) -> SchemaGeneration {
        self.generation
    }

    /// Term filter on a field that may live at a legacy path too
    pub fn mirrored_term(&self, field: MirroredField, value: Value) -> Value {
        let mut terms: Vec<Value> = self
            .generation
            .paths(field)
            .into_iter()
            .map(|path| json!({ "term": { path: value.clone() } }))
            .collect();

        if terms.len() == 1 {
            terms.remove(0)
        } else {
            json!({ "bool": { "should": terms, "minimum_should_match": 1 } })
        }
    }

    pub fn chat_filter(&self, chat_id: i64) -> Value {
        self.mirrored_term(MirroredField::ChatId, json!(chat_id))
    }

    pub fn sender_filter(&self, user_id: i64) -> Value {
        self.mirrored_term(MirroredField::SenderId, json!(user_id))
    }

    /// Matches soft-deleted documents; used under `must_not`
    pub fn deleted_marker() -> Value {
        json!({ "term": { fields::IS_DELETED: true } })
    }

    /// Inclusive timestamp window, `None` when unbounded on both sides
    pub fn timestamp_range(from: Option<i64>, to: Option<i64>) -> Option<Value> {
        if from.is_none() && to.is_none() {
            return None;
        }
        let mut bounds = serde_json::Map::new();
        if let Some(from) = from {
            bounds.insert("gte".to_string(), json!(from));
        }
        if let Some(to) = to {
            bounds.insert("lte".to_string(), json!(to));
        }
        Some(json!({ "range": { fields::TIMESTAMP: bounds } }))
    }

    /// Scoring clause for the keyword; `None` for an empty keyword
    pub fn keyword_clause(query: &str, exact: bool) -> Option<Value> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        Some(if exact {
            json!({
                "multi_match": {
                    "query": query,
                    "type": "phrase",
                    "fields": EXACT_BODY_FIELDS
                }
            })
        } else {
            // Bigrams already absorb partial matches; no fuzziness on top
            json!({
                "multi_match": {
                    "query": query,
                    "fields": BODY_FIELDS
                }
            })
        })
    }

    /// Compound query for a search request, without paging
    pub fn search_query(&self, request: &SearchRequest) -> SearchResult<Value> {
        let mut filter = Vec::new();
        let mut must_not = Vec::new();

        if let Some(chat_type) = request
            .chat_type
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            filter.push(self.mirrored_term(MirroredField::ChatType, json!(chat_type.to_lowercase())));
        }

        if let Some(username) = request.username.as_deref().and_then(normalize_username) {
            filter.push(self.mirrored_term(MirroredField::SenderUsername, json!(username)));
        }

        if let Some(chat_id) = request.chat_id {
            filter.push(self.chat_filter(chat_id));
        }

        if let (Some(from), Some(to)) = (request.from_timestamp, request.to_timestamp) {
            if from > to {
                return Err(SearchError::InvalidRequest(format!(
                    "fromTimestamp {} is after toTimestamp {}",
                    from, to
                )));
            }
        }
        if let Some(range) = Self::timestamp_range(request.from_timestamp, request.to_timestamp) {
            filter.push(range);
        }

        if !request.include_deleted {
            must_not.push(Self::deleted_marker());
        }

        for user_id in &request.blocked_user_ids {
            must_not.push(self.sender_filter(*user_id));
        }

        let must = Self::keyword_clause(&request.query, request.exact_match)
            .unwrap_or_else(|| json!({ "match_all": {} }));

        Ok(json!({
            "bool": {
                "must": [must],
                "filter": filter,
                "must_not": must_not
            }
        }))
    }

    /// Full `_search` body for one page of results
    pub fn search_body(&self, request: &SearchRequest) -> SearchResult<Value> {
        let from = request.offset();
        let size = u64::from(request.page_size);
        if from + size > self.max_result_window {
            return Err(SearchError::InvalidRequest(format!(
                "page {} with pageSize {} reaches past the result window of {}",
                request.page, request.page_size, self.max_result_window
            )));
        }

        Ok(json!({
            "query": self.search_query(request)?,
            "sort": [
                { fields::TIMESTAMP: { "order": "desc" } },
                { fields::MESSAGE_ID: { "order": "desc" } }
            ],
            "from": from,
            "size": size,
            "track_total_hits": true,
            "track_scores": true
        }))
    }
}
