//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, error};
use watch_progress_core::{CoreError, PortError};

use crate::{error::ApiError, web::state::AppState};

/// Middleware that validates the auth session cookie and extracts the user_id.
///
/// If valid, inserts the user_id into request extensions for handlers to use.
/// If invalid or missing, the request is rejected before any handler runs.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract the session id from the cookie header
    let auth_session_id = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(session_from_cookie)
        .ok_or(ApiError::NotLoggedIn)?;

    // 2. Resolve the session to a user
    let user_id = match state.identity.resolve_session(auth_session_id).await {
        Ok(user_id) => user_id,
        Err(PortError::Unauthorized) | Err(PortError::NotFound(_)) => {
            debug!("Rejected unknown or expired session");
            return Err(ApiError::NotLoggedIn);
        }
        Err(e) => {
            error!("Failed to validate auth session: {:?}", e);
            return Err(ApiError::Core(CoreError::Port(e)));
        }
    };

    // 3. Insert user_id into request extensions
    req.extensions_mut().insert(user_id);

    // 4. Continue to the handler
    Ok(next.run(req).await)
}

/// Finds the non-empty `session=` value in a `Cookie` header.
fn session_from_cookie(cookie_header: &str) -> Option<&str> {
    cookie_header
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
}
