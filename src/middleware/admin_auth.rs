use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::AppState;

/// Middleware that validates the `Authorization: Bearer <token>` header
/// against the configured admin token.
///
/// - With no admin token configured, the routes answer 404 (hidden).
/// - A missing or wrong token gets 401.
pub async fn require_admin_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_token.clone() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let provided = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => next.run(req).await,
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}
