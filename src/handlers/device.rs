use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};

use crate::error::AppError;
use crate::middleware::device_auth::DeviceSession;
use crate::models::device::{DeviceLogin, SubscriptionResponse};
use crate::session::{generate_device_login, refresh_token_key};
use crate::util::token_prefix;
use crate::AppState;

/// GET /v1/auth/token — exchange a refresh token for a new device login.
///
/// The bearer token is a refresh token, not an access token, so this
/// route bypasses the device-auth middleware and reads the header itself.
/// Redemption is single-use: the cache entry is taken atomically, so of
/// two concurrent redemptions exactly one succeeds.
pub async fn refresh_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(handler = "refresh_token", "Handler: GET /v1/auth/token");

    let Some(value) = headers.get(header::AUTHORIZATION) else {
        tracing::warn!(handler = "refresh_token", "Missing Authorization header");
        return Err(AppError::Unauthorized);
    };
    let Some(refresh) = value.to_str().ok().and_then(|v| v.strip_prefix("Bearer ")) else {
        tracing::warn!(handler = "refresh_token", "Authorization header is not a bearer token");
        return Err(AppError::Unauthorized);
    };

    tracing::debug!(
        handler = "refresh_token",
        refresh_token = %token_prefix(refresh),
        "Dispatching to cache.take"
    );
    let Some(payload) = state.cache.take(&refresh_token_key(refresh)).await? else {
        tracing::warn!(
            handler = "refresh_token",
            refresh_token = %token_prefix(refresh),
            "Refresh token unknown or already redeemed"
        );
        return Err(AppError::Unauthorized);
    };

    let old_login: DeviceLogin =
        serde_json::from_str(&payload).map_err(|_| AppError::Unauthorized)?;

    let login = generate_device_login(
        &old_login.uuid,
        state.cache.as_ref(),
        state.access_token_ttl,
        state.refresh_token_ttl,
    )
    .await?;

    tracing::info!(
        handler = "refresh_token",
        device_id = %login.uuid,
        status = 200,
        "Responding: new device login issued"
    );

    Ok(Json(login))
}

/// GET /v1/device/:device_id/subscription — membership tier of the
/// account owning a device. Accounts without a membership are "free";
/// a device no account owns gets an empty 204.
pub async fn subscription(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    Extension(DeviceSession(login)): Extension<DeviceSession>,
) -> Result<Response, AppError> {
    tracing::info!(
        handler = "subscription",
        device_id = %device_id,
        "Handler: GET /v1/device/:device_id/subscription"
    );

    // The session must belong to the device being queried
    if login.uuid != device_id {
        tracing::warn!(
            handler = "subscription",
            device_id = %device_id,
            session_device_id = %login.uuid,
            "Session device mismatch"
        );
        return Err(AppError::Unauthorized);
    }

    tracing::debug!(
        handler = "subscription",
        "Dispatching to repo.get_account_by_device_id"
    );
    let account = state.accounts.get_account_by_device_id(&device_id).await?;
    tracing::debug!(handler = "subscription", found = account.is_some(), "Repo returned");

    match account {
        Some(account) => {
            let membership_type = account
                .membership
                .map(|m| m.membership_type)
                .unwrap_or_else(|| "free".to_string());

            tracing::info!(
                handler = "subscription",
                device_id = %device_id,
                membership_type = %membership_type,
                status = 200,
                "Responding: subscription tier"
            );

            Ok(Json(SubscriptionResponse { membership_type }).into_response())
        }
        None => {
            tracing::info!(
                handler = "subscription",
                device_id = %device_id,
                status = 204,
                "Responding: no account associated with device"
            );
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}
