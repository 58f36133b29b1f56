//! Defines the gateway's routes.
//!
//! ## Structure
//! - `GET  /healthz`: liveness probe
//! - `GET  /{bucket}/{*object}`: stream an object
//! - `HEAD /{bucket}/{*object}`: object headers only
//!
//! The wildcard `*object` allows nested names like `photos/2025/img.jpg`.
//! Anything else falls through to axum's empty 404.

use crate::{
    handlers::{health_handlers::healthz, object_handlers::serve_object},
    logging::access_log,
    state::AppState,
};
use axum::{Router, middleware, routing::get};

/// Build the route table. The router carries `AppState` to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/{bucket}/{*object}", get(serve_object).head(serve_object))
}

/// Routes with state and the access log applied, ready to serve.
pub fn app(state: AppState) -> Router {
    routes()
        .layer(middleware::from_fn_with_state(state.clone(), access_log))
        .with_state(state)
}
