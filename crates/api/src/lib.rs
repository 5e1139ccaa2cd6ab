pub mod error;
pub mod state;
pub mod ws;

use axum::{routing::get, Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Builds the process router: a health check plus the single streaming
/// endpoint (spec §4.1). Follows the teacher's `build_router` composition
/// pattern (`lib.rs`) — CORS and request tracing as outer layers, routes
/// nested under `.with_state`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws/streaming-audio", get(ws::ws_upgrade))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
