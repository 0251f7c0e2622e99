//! Per-user activity aggregation

use crate::models::{
    activity_ratio, UserStatsRequest, UserStatsResponse, MENTION_ENTITY_TYPES,
    TEXT_MENTION_ENTITY_TYPE,
};
use crate::search::backend::SearchBackend;
use crate::search::error::SearchResult;
use crate::search::query::QueryBuilder;
use crate::search::schema::fields;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

pub struct StatsService {
    backend: Arc<dyn SearchBackend>,
    queries: QueryBuilder,
}

impl StatsService {
    pub fn new(backend: Arc<dyn SearchBackend>, queries: QueryBuilder) -> Self {
        Self { backend, queries }
    }

    async fn count(&self, filter: Vec<Value>, must_not: Vec<Value>) -> SearchResult<u64> {
        self.backend
            .count(&json!({
                "query": { "bool": { "filter": filter, "must_not": must_not } }
            }))
            .await
    }

    /// Count a mention query, zero-filling on failure
    async fn mention_count(
        &self,
        direction: &'static str,
        filter: Vec<Value>,
        must_not: Vec<Value>,
        partial: &mut bool,
    ) -> u64 {
        match self.count(filter, must_not).await {
            Ok(count) => count,
            Err(e) => {
                warn!(direction = direction, error = %e, "Mention count failed; reporting zero");
                *partial = true;
                0
            }
        }
    }

    pub async fn user_stats(&self, request: &UserStatsRequest) -> SearchResult<UserStatsResponse> {
        let mut scope = vec![self.queries.chat_filter(request.group_id)];
        scope.extend(QueryBuilder::timestamp_range(Some(request.from), Some(request.to)));

        let mut exclusions = Vec::new();
        if !request.include_deleted {
            exclusions.push(QueryBuilder::deleted_marker());
        }

        let sender = self.queries.sender_filter(request.user_id);
        let mut user_scope = scope.clone();
        user_scope.push(sender.clone());

        let (user_count, group_count) = futures::try_join!(
            self.count(user_scope.clone(), exclusions.clone()),
            self.count(scope.clone(), exclusions.clone()),
        )?;

        let mut response = UserStatsResponse {
            group_id: request.group_id,
            user_id: request.user_id,
            from: request.from,
            to: request.to,
            user_message_count: user_count,
            group_message_count: group_count,
            ratio: activity_ratio(user_count, group_count),
            ..Default::default()
        };

        if request.include_mentions {
            let mut outgoing = user_scope;
            outgoing.push(json!({
                "nested": {
                    "path": fields::ENTITIES,
                    "query": { "terms": { fields::ENTITY_TYPE: MENTION_ENTITY_TYPES } }
                }
            }));

            let mut incoming = scope;
            incoming.push(json!({
                "nested": {
                    "path": fields::ENTITIES,
                    "query": {
                        "bool": {
                            "filter": [
                                { "term": { fields::ENTITY_TYPE: TEXT_MENTION_ENTITY_TYPE } },
                                { "term": { fields::ENTITY_USER_ID: request.user_id } }
                            ]
                        }
                    }
                }
            }));
            let mut incoming_exclusions = exclusions.clone();
            incoming_exclusions.push(sender);

            let mut partial = false;
            let mentions_out = self
                .mention_count("outgoing", outgoing, exclusions, &mut partial)
                .await;
            let mentions_in = self
                .mention_count("incoming", incoming, incoming_exclusions, &mut partial)
                .await;

            response.mentions_out = Some(mentions_out);
            response.mentions_in = Some(mentions_in);
            response.mentions_partial = partial;
        }

        debug!(
            group_id = request.group_id,
            user_id = request.user_id,
            user_messages = response.user_message_count,
            group_messages = response.group_message_count,
            "Computed user stats"
        );
        Ok(response)
    }
}
