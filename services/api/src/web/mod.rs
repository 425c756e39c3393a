pub mod middleware;
pub mod rest;
pub mod state;

pub use middleware::require_auth;
pub use rest::{
    clear_history_handler, continue_watching_handler, get_progress_handler, health_handler,
    history_handler, save_progress_handler,
};

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use state::AppState;

/// Builds the application router. Everything under `/api` sits behind the
/// session check; `/health` is public.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new().route("/health", get(health_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/api/progress",
            post(save_progress_handler).get(get_progress_handler),
        )
        .route("/api/continue-watching", get(continue_watching_handler))
        .route(
            "/api/history",
            get(history_handler).delete(clear_history_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
