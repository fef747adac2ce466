// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::handlers::{health_handler, metrics_handler};
use crate::auth::TokenStore;
use crate::realtime::RealtimeChannel;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub channel: RealtimeChannel,
    pub tokens: TokenStore,
}

pub fn create_router(channel: RealtimeChannel, tokens: TokenStore) -> Router {
    let state = AppState { channel, tokens };

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
