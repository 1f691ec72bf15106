use crate::state::AppState;
use crate::transport::TransportEngine;
use axum::{extract::State, Json};
use serde::Serialize;
use splitcast_protocol::IceServer;

#[derive(Debug, Serialize)]
pub struct IceServersResponse {
    pub ice_servers: Vec<IceServer>,
}

/// ICE servers the SFU connections use, so clients can configure theirs alike
pub async fn get_ice_servers<E: TransportEngine>(
    State(state): State<AppState<E>>,
) -> Json<IceServersResponse> {
    Json(IceServersResponse {
        ice_servers: state.config.ice_servers(),
    })
}
