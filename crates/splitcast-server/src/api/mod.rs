mod ice;

use crate::state::AppState;
use crate::transport::TransportEngine;
use crate::ws;
use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeFile;
use tower_http::trace::TraceLayer;

pub fn create_router<E: TransportEngine>(state: AppState<E>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Everything that is not an API route gets the client page
    let client_page = ServeFile::new(&state.config.index_file);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // WebRTC configuration
        .route("/api/rtc/ice-servers", get(ice::get_ice_servers::<E>))
        // Signaling endpoint
        .route("/ws", get(ws::handler::ws_handler::<E>))
        .fallback_service(client_page)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
