use std::sync::Arc;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use super::app_state::AppState;
use super::{rest_api, ws_handler};

/// Build the axum router with all HTTP and WebSocket routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Restrict CORS to the configured public origin (or allow any for localhost dev)
    let public_url = &state.public_url;
    let cors = if public_url.contains("localhost") || public_url.contains("127.0.0.1") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origin = public_url
            .parse::<HeaderValue>()
            .unwrap_or_else(|_| HeaderValue::from_static("https://localhost"));
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Real-time channel, one connection per (client, session)
    let ws_routes = Router::new().route("/sessions/{session_id}", get(ws_handler::ws_upgrade));

    // Control plane
    let api_routes = Router::new()
        .route(
            "/api/sessions",
            post(rest_api::create_session).get(rest_api::list_sessions),
        )
        .route("/api/sessions/public", get(rest_api::list_public_sessions))
        .route("/api/sessions/{id}", get(rest_api::get_session))
        .route("/api/sessions/{id}/join", post(rest_api::join_session))
        .route("/api/sessions/{id}/download", get(rest_api::download_session));

    Router::new()
        .merge(ws_routes)
        .merge(api_routes)
        .layer(cors)
        .with_state(state)
}
