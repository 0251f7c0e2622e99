//! Soft-delete, clear and deduplication

use crate::metrics;
use crate::models::{DedupReport, Message};
use crate::search::backend::{BulkOperation, RefreshPolicy, SearchBackend};
use crate::search::config::SearchConfig;
use crate::search::dedup::{DuplicateGroup, DuplicateSweep};
use crate::search::error::SearchResult;
use crate::search::query::QueryBuilder;
use crate::search::schema::fields;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Painless script copying `params.fields` into the document source
pub const SET_FIELDS_SCRIPT: &str =
    "for (entry in params.fields.entrySet()) { ctx._source.put(entry.getKey(), entry.getValue()) }";

/// Fields written when a message is soft-deleted at `deleted_at`
pub fn soft_delete_fields(deleted_at: i64) -> Value {
    json!({
        fields::IS_DELETED: true,
        fields::DELETED_AT: deleted_at,
    })
}

pub struct MaintenanceService {
    backend: Arc<dyn SearchBackend>,
    queries: QueryBuilder,
    config: SearchConfig,
}

impl MaintenanceService {
    pub fn new(backend: Arc<dyn SearchBackend>, config: SearchConfig) -> Self {
        Self {
            backend,
            queries: QueryBuilder::new(config.schema_generation, config.max_result_window),
            config,
        }
    }

    /// Mark one message deleted; `NotFound` when no document has its id
    pub async fn soft_delete(&self, chat_id: i64, message_id: i64) -> SearchResult<String> {
        let id = Message::composite_id(chat_id, message_id);
        self.backend
            .update_document(
                &id,
                &soft_delete_fields(Utc::now().timestamp()),
                self.config.refresh,
            )
            .await?;

        info!(id = %id, chat_id = chat_id, message_id = message_id, "Soft-deleted message");
        Ok(id)
    }

    /// Soft-delete every live message matching `scope`
    async fn soft_delete_where(&self, scope: Value) -> SearchResult<u64> {
        let body = json!({
            "query": {
                "bool": {
                    "filter": [scope],
                    "must_not": [QueryBuilder::deleted_marker()]
                }
            },
            "script": {
                "source": SET_FIELDS_SCRIPT,
                "lang": "painless",
                "params": { "fields": soft_delete_fields(Utc::now().timestamp()) }
            }
        });
        self.backend.update_by_query(&body).await
    }

    pub async fn delete_by_chat(&self, chat_id: i64) -> SearchResult<u64> {
        let updated = self
            .soft_delete_where(self.queries.chat_filter(chat_id))
            .await?;
        info!(chat_id = chat_id, deleted = updated, "Soft-deleted chat messages");
        Ok(updated)
    }

    pub async fn delete_by_user(&self, user_id: i64) -> SearchResult<u64> {
        let updated = self
            .soft_delete_where(self.queries.sender_filter(user_id))
            .await?;
        info!(user_id = user_id, deleted = updated, "Soft-deleted user messages");
        Ok(updated)
    }

    /// Physically remove every document in the index
    pub async fn clear(&self) -> SearchResult<u64> {
        let deleted = self
            .backend
            .delete_by_query(&json!({ "query": { "match_all": {} } }))
            .await?;
        warn!(index = %self.backend.index_name(), deleted = deleted, "Cleared search index");
        Ok(deleted)
    }

    /// Keep the newest copy of every `(chatID, messageID)` and delete the rest
    pub async fn dedup(&self) -> SearchResult<DedupReport> {
        let mut sweep = DuplicateSweep::new(
            self.backend.clone(),
            self.config.dedup_page_size,
            self.config.dedup_top_hits,
        );
        let mut report = DedupReport::default();

        while let Some(groups) = sweep.next_page().await? {
            let mut stale = Vec::new();
            for group in &groups {
                report.groups += 1;
                report.duplicates_found += group.surplus();
                stale.extend(group.remove.iter().cloned());
            }
            self.delete_copies(stale, &mut report).await?;

            for group in groups.iter().filter(|group| group.is_truncated()) {
                debug!(
                    chat_id = group.chat_id,
                    message_id = group.message_id,
                    copies = group.total,
                    "Duplicate group exceeds the top-hits page; removing remaining copies"
                );
                self.remove_remaining_copies(group, &mut report).await?;
            }
        }

        info!(
            groups = report.groups,
            found = report.duplicates_found,
            removed = report.duplicates_removed,
            failed = report.errors.len(),
            "Deduplication sweep finished"
        );
        Ok(report)
    }

    /// Page through a group's older copies until only `keep` is left
    async fn remove_remaining_copies(
        &self,
        group: &DuplicateGroup,
        report: &mut DedupReport,
    ) -> SearchResult<()> {
        loop {
            let response = self
                .backend
                .search(&json!({
                    "size": self.config.dedup_top_hits.max(1),
                    "query": {
                        "bool": {
                            "filter": [
                                { "term": { fields::CHAT_ID: group.chat_id } },
                                { "term": { fields::MESSAGE_ID: group.message_id } }
                            ],
                            "must_not": [{ "ids": { "values": [group.keep.as_str()] } }]
                        }
                    },
                    "sort": [{ fields::TIMESTAMP: { "order": "desc" } }],
                    "_source": [fields::TIMESTAMP]
                }))
                .await?;

            let ids: Vec<String> = response["hits"]["hits"]
                .as_array()
                .map(|hits| {
                    hits.iter()
                        .filter_map(|hit| hit["_id"].as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            if ids.is_empty() {
                return Ok(());
            }
            // Copies that keep failing would be returned forever
            if self.delete_copies(ids, report).await? == 0 {
                return Ok(());
            }
        }
    }

    /// Bulk-delete `ids`, returning how many are gone afterwards.
    ///
    /// A copy that is already missing counts as removed.
    async fn delete_copies(&self, ids: Vec<String>, report: &mut DedupReport) -> SearchResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let operations = ids
            .into_iter()
            .map(|id| BulkOperation::Delete { id })
            .collect();
        // Later searches of the same sweep must not see the deleted copies
        let response = self
            .backend
            .bulk(operations, RefreshPolicy::WaitFor)
            .await?;

        let mut removed = 0;
        for item in &response.items {
            if item.succeeded() || (item.status == 404 && item.error.is_none()) {
                removed += 1;
            } else {
                report.errors.push(format!(
                    "{}: {}",
                    item.id,
                    item.error.as_deref().unwrap_or("not deleted")
                ));
            }
        }

        report.duplicates_removed += removed;
        metrics::DEDUP_REMOVED_TOTAL.inc_by(removed);
        Ok(removed)
    }
}
