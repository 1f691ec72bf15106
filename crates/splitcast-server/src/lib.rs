//! Splitcast Server Library
//!
//! A minimal SFU: clients publish on one peer connection and receive every
//! other client's media on a second one. This module exposes the server
//! components for testing and embedding.

pub mod api;
pub mod error;
pub mod sfu;
pub mod state;
pub mod transport;
pub mod ws;

use transport::TransportEngine;

/// Create the server application on top of a transport engine
pub fn create_app<E: TransportEngine>(config: state::Config, engine: E) -> axum::Router {
    let app_state = state::AppState::new(config, engine);
    api::create_router(app_state)
}
