use crate::api::{AppState, ValidatedJson};
use crate::auth::Claims;
use crate::error::{AppError, Result};
use crate::metrics;
use crate::models::*;
use axum::{
    extract::{rejection::QueryRejection, Extension, Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use std::time::Instant;
use tracing::info;

/// Liveness probe; never touches the index
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}

/// Service banner on `/`
pub async fn service_info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        service: state.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints: crate::api::PROTECTED_ENDPOINTS
            .iter()
            .map(|e| e.to_string())
            .collect(),
    })
}

/// Prometheus exposition
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

/// Index or overwrite one message
pub async fn upsert_message(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
    ValidatedJson(message): ValidatedJson<Message>,
) -> Result<Json<UpsertResponse>> {
    let id = state.search.upsert(&message).await?;

    info!(
        id = %id,
        issuer = caller(&claims),
        "Message upserted"
    );
    Ok(Json(UpsertResponse { success: true, id }))
}

/// Index a batch; per-document failures are reported, not raised
pub async fn batch_upsert(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<BatchUpsertRequest>,
) -> Result<Json<BatchUpsertResponse>> {
    let max = state.server.max_batch_size;
    if request.messages.len() > max {
        return Err(AppError::Validation(format!(
            "batch of {} messages exceeds the limit of {}",
            request.messages.len(),
            max
        )));
    }

    let response = state.search.batch_upsert(&request.messages).await?;
    Ok(Json(response))
}

/// Keyword + filter search
pub async fn search_messages(
    State(state): State<AppState>,
    ValidatedJson(mut request): ValidatedJson<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();

    let max = state.server.max_page_size;
    if request.page_size > max {
        tracing::debug!(requested = request.page_size, max = max, "Clamping page size");
        request.page_size = max;
    }

    let page = state.search.search(&request).await?;
    let took_ms = start.elapsed().as_millis() as u64;

    Ok(Json(SearchResponse::from_page(page, took_ms)))
}

pub async fn soft_delete_message(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
    ValidatedJson(request): ValidatedJson<SoftDeleteRequest>,
) -> Result<Json<MessageResponse>> {
    let id = state
        .maintenance
        .soft_delete(request.chat_id, request.message_id)
        .await?;

    info!(
        id = %id,
        issuer = caller(&claims),
        "Message soft-deleted"
    );
    Ok(Json(MessageResponse::ok(format!("message {} marked as deleted", id))))
}

/// `DELETE /api/v1/messages?chat_id=`
pub async fn delete_chat_messages(
    State(state): State<AppState>,
    query: std::result::Result<Query<DeleteByChatQuery>, QueryRejection>,
) -> Result<Json<DeleteResponse>> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;

    let deleted_count = state.maintenance.delete_by_chat(query.chat_id).await?;
    Ok(Json(DeleteResponse {
        success: true,
        deleted_count,
    }))
}

pub async fn delete_user_messages(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<DeleteResponse>> {
    let deleted_count = state.maintenance.delete_by_user(user_id).await?;
    Ok(Json(DeleteResponse {
        success: true,
        deleted_count,
    }))
}

/// Hard-delete every document in the index
pub async fn clear_index(
    State(state): State<AppState>,
    claims: Option<Extension<Claims>>,
) -> Result<Json<MessageResponse>> {
    let deleted = state.maintenance.clear().await?;

    tracing::warn!(
        deleted = deleted,
        issuer = caller(&claims),
        "Index cleared"
    );
    Ok(Json(MessageResponse::ok(format!(
        "deleted {} documents",
        deleted
    ))))
}

pub async fn dedup_messages(State(state): State<AppState>) -> Result<Json<DedupResponse>> {
    let report = state.maintenance.dedup().await?;
    Ok(Json(DedupResponse::from(report)))
}

pub async fn user_stats(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<UserStatsRequest>,
) -> Result<Json<UserStatsResponse>> {
    let response = state.stats.user_stats(&request).await?;
    Ok(Json(response))
}

/// Reachability of the index plus a document count
pub async fn ping(State(state): State<AppState>) -> Result<Json<PingResponse>> {
    let index = state.index();
    let (cluster, total_documents) =
        futures::try_join!(index.cluster_info(), index.total_documents())?;

    Ok(Json(PingResponse {
        status: "ok".to_string(),
        engine: cluster.engine,
        version: cluster.version,
        total_documents,
        uptime_seconds: state.uptime_seconds(),
    }))
}

pub async fn index_stats(State(state): State<AppState>) -> Result<Json<IndexStatsResponse>> {
    let stats = state.index().get_stats().await?;
    Ok(Json(stats))
}

/// Service status; reports `degraded` instead of failing when the index is down
pub async fn service_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let (status, message_index_total) = match state.index().total_documents().await {
        Ok(total) => ("ok", total),
        Err(e) => {
            tracing::warn!(error = %e, "Index unreachable while reporting status");
            ("degraded", 0)
        }
    };

    Json(StatusResponse {
        service: state.service_name.clone(),
        status: status.to_string(),
        hostname: hostname(),
        uptime_seconds: state.uptime_seconds(),
        message_index_total,
        timestamp: Utc::now(),
    })
}

/// Issuer of the verified token, for audit lines
fn caller(claims: &Option<Extension<Claims>>) -> &str {
    claims
        .as_ref()
        .map(|Extension(c)| c.iss.as_str())
        .unwrap_or("-")
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
