use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::supervisor::SupervisorSnapshot;

use super::AppState;

/// Body of `GET /status`.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub producer: SupervisorSnapshot,
    pub observers: usize,
}

/// `GET /status`: producer lifecycle and observer count.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        producer: state.hub.supervisor().snapshot(),
        observers: state.hub.observer_count().await,
    })
}
