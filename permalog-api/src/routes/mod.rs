//! API route handlers

pub mod admin;
pub mod health;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::auth;
use crate::state::AppState;

/// Create the API router. Health is public; everything else sits behind
/// the bearer secret when one is configured.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/trigger", post(admin::trigger))
        .route("/test-bundle", post(admin::test_bundle))
        .route(
            "/test-verify",
            get(admin::inspect_bundles).post(admin::inject_bundle),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/", get(health::health))
        .merge(protected)
        .with_state(state)
}
