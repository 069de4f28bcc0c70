use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::gateway::QueueGateway;

/// Application state shared across handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub gateway: QueueGateway,
}

impl AppState {
    pub fn new(gateway: QueueGateway) -> Self {
        Self { gateway }
    }
}

/// Build the relay router. CORS is wide open: the browser client is served
/// from a different origin than the API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route(
            "/messages",
            get(handlers::take_message).post(handlers::publish_message),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
