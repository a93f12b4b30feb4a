//! HTTP surface: the observer WebSocket and a status endpoint.

mod routes;
mod ws;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::get;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::warn;

use crate::hub::BroadcastHub;

pub use routes::{StatusResponse, status};
pub use ws::ws_handler;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
}

/// Build the relay router.
///
/// `allowed_origins` is the CORS allow-list; empty or `"*"` allows any origin.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/status", get(status))
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods([Method::GET]);
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(origin, error = %e, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
