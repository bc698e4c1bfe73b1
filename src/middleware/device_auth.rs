use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::models::device::DeviceLogin;
use crate::session::access_token_key;
use crate::util::token_prefix;
use crate::AppState;

/// Validate the `Authorization: Bearer <access token>` header against the
/// cached device session. A hit attaches the deserialized login as a
/// request extension; anything else is a bare 401.
pub async fn require_device_token(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let uri = req.uri().path().to_string();

    let token = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string());

    let Some(token) = token else {
        tracing::warn!(
            method = %method,
            uri = %uri,
            "Device auth middleware: rejected — missing or malformed Authorization header"
        );
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match state.cache.get(&access_token_key(&token)).await {
        Ok(Some(payload)) => match serde_json::from_str::<DeviceLogin>(&payload) {
            Ok(login) => {
                tracing::debug!(
                    access_token = %token_prefix(&token),
                    device_id = %login.uuid,
                    method = %method,
                    uri = %uri,
                    "Device auth middleware: session valid, forwarding to handler"
                );
                req.extensions_mut().insert(DeviceSession(login));
                next.run(req).await
            }
            Err(e) => {
                tracing::error!(
                    access_token = %token_prefix(&token),
                    error = %e,
                    "Device auth middleware: cached session payload unreadable"
                );
                StatusCode::UNAUTHORIZED.into_response()
            }
        },
        Ok(None) => {
            tracing::warn!(
                access_token = %token_prefix(&token),
                method = %method,
                uri = %uri,
                "Device auth middleware: rejected — unknown or expired access token"
            );
            StatusCode::UNAUTHORIZED.into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Extractor for the authenticated device session.
#[derive(Debug, Clone)]
pub struct DeviceSession(pub DeviceLogin);
