//! Route definitions for the NotifyHub HTTP API.

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::cors::build_cors_layer;
use crate::state::AppState;

/// Build the complete router: `/api/*` endpoints plus the `/ws` upgrade.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(notification_routes())
        .merge(metrics_routes())
        .merge(health_routes());

    let cors = build_cors_layer(&state.config.server);

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(handlers::ws::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn notification_routes() -> Router<AppState> {
    Router::new().route(
        "/notifications",
        post(handlers::notification::create_notification),
    )
}

fn metrics_routes() -> Router<AppState> {
    Router::new()
        .route("/metrics", get(handlers::metrics::engine_metrics))
        .route(
            "/metrics/notifications/{id}",
            get(handlers::metrics::notification_metrics),
        )
}

fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health))
}
