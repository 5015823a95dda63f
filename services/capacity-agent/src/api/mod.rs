//! HTTP surface of the agent.

mod health;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use health::HealthResponse;

/// Create the router.
pub fn create_router() -> Router {
    Router::new()
        .merge(health::routes())
        .layer(TraceLayer::new_for_http())
}
