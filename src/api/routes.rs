use crate::api::{handlers, AppState};
use crate::auth::{require_bearer, RouteGroup, RouteGuard};
use crate::metrics::MetricsLayer;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Protected endpoints advertised on `/`
pub const PROTECTED_ENDPOINTS: [&str; 12] = [
    "POST /api/v1/upsert",
    "POST /api/v1/upsert/batch",
    "POST /api/v1/search",
    "POST /api/v1/messages/soft-delete",
    "DELETE /api/v1/messages?chat_id=",
    "DELETE /api/v1/users/:user_id",
    "DELETE /api/v1/clear",
    "POST /api/v1/dedup",
    "POST /api/v1/stats/user",
    "GET /api/v1/ping",
    "GET /api/v1/stats",
    "GET /api/v1/status",
];

/// Gate every route of `router` behind `group`'s issuer allow-list
fn guarded(router: Router<AppState>, state: &AppState, group: RouteGroup) -> Router<AppState> {
    let guard = RouteGuard::new(state.authenticator.clone(), group);
    router.route_layer(middleware::from_fn_with_state(guard, require_bearer))
}

/// Build the main API router
pub fn build_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.server.request_timeout_secs);
    let dedup_timeout = Duration::from_secs(state.server.dedup_timeout_secs);

    let ingest = guarded(
        Router::new()
            .route("/upsert", post(handlers::upsert_message))
            .route("/upsert/batch", post(handlers::batch_upsert)),
        &state,
        RouteGroup::Ingest,
    );

    let search = guarded(
        Router::new().route("/search", post(handlers::search_messages)),
        &state,
        RouteGroup::Search,
    );

    let maintenance = guarded(
        Router::new()
            .route("/messages/soft-delete", post(handlers::soft_delete_message))
            .route("/messages", delete(handlers::delete_chat_messages))
            .route("/users/:user_id", delete(handlers::delete_user_messages))
            .route("/clear", delete(handlers::clear_index)),
        &state,
        RouteGroup::Maintenance,
    );

    let stats = guarded(
        Router::new().route("/stats/user", post(handlers::user_stats)),
        &state,
        RouteGroup::Stats,
    );

    let info = guarded(
        Router::new()
            .route("/ping", get(handlers::ping))
            .route("/stats", get(handlers::index_stats))
            .route("/status", get(handlers::service_status)),
        &state,
        RouteGroup::Info,
    );

    // Dedup sweeps the whole index and gets its own, longer deadline
    let dedup = guarded(
        Router::new().route("/dedup", post(handlers::dedup_messages)),
        &state,
        RouteGroup::Maintenance,
    )
    .layer(TimeoutLayer::new(dedup_timeout));

    let api = Router::new()
        .merge(ingest)
        .merge(search)
        .merge(maintenance)
        .merge(stats)
        .merge(info)
        .layer(TimeoutLayer::new(request_timeout))
        .merge(dedup);

    let mut router = Router::new()
        // Unauthenticated surface
        .route("/", get(handlers::service_info))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api);

    if state.prometheus_enabled {
        router = router.route("/metrics", get(handlers::metrics_handler));
    }

    router
        // Add state
        .with_state(state)
        // Add middleware
        .layer(MetricsLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(false))
                .on_response(DefaultOnResponse::new().include_headers(false)),
        )
        .layer(CorsLayer::permissive())
}
