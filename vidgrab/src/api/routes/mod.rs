//! API route modules.
//!
//! The control endpoints keep the flat `/api/<action>` paths the web client
//! already uses.

pub mod downloads;
pub mod health;
pub mod logging;
pub mod probe;
pub mod progress;

use axum::Router;

use crate::api::server::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(downloads::router())
                .merge(probe::router())
                .nest("/logging", logging::router()),
        )
        .nest("/ws", progress::router())
        .nest("/health", health::router())
        .with_state(state)
}
