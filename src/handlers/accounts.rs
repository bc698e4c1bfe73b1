use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use sha2::{Digest, Sha512};

use crate::error::AppError;
use crate::models::account::{
    CreateAccountRequest, CreateAccountResponse, DeleteResponse, NewAccount,
};
use crate::util::today_utc;
use crate::AppState;

/// POST /api/account — create an account.
/// Both agreement flags must be accepted. Credentials are either an
/// email/password pair (base64-encoded) or a federated platform token;
/// federated signups may omit the email entirely.
pub async fn create_account(
    State(state): State<AppState>,
    Json(body): Json<CreateAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        handler = "create_account",
        federated = body.login.federated_platform.is_some(),
        "Handler: POST /api/account"
    );

    let email = body.login.decoded_email().map_err(AppError::BadRequest)?;
    let password = body.login.decoded_password().map_err(AppError::BadRequest)?;

    let limiter_key = email
        .clone()
        .or_else(|| body.login.federated_platform.clone())
        .unwrap_or_else(|| "anonymous".to_string());
    if !state.signup_limiter.check(&limiter_key).await {
        return Err(AppError::TooManyRequests("Rate limit exceeded".into()));
    }

    if !body.terms_of_use || !body.privacy_policy {
        tracing::warn!(
            handler = "create_account",
            "Validation failed: agreements not accepted"
        );
        return Err(AppError::BadRequest(
            "terms of use and privacy policy must both be accepted".into(),
        ));
    }

    let has_login = email.is_some() && password.is_some();
    let has_federated =
        body.login.federated_platform.is_some() && body.login.federated_token.is_some();
    if !has_login && !has_federated {
        tracing::warn!(
            handler = "create_account",
            "Validation failed: no usable credentials"
        );
        return Err(AppError::BadRequest(
            "either email and password or a federated token is required".into(),
        ));
    }

    let new_account = NewAccount {
        email_address: email,
        password_hash: password.map(|p| hex::encode(Sha512::digest(p.as_bytes()))),
        federated_platform: body.login.federated_platform,
        accept_date: today_utc(),
    };

    tracing::debug!(handler = "create_account", "Dispatching to repo.add_account");
    let account_id = state.accounts.add_account(&new_account).await?;
    tracing::debug!(
        handler = "create_account",
        account_id = %account_id,
        "Repo returned: account created"
    );

    state.activity.increment_accounts_added(today_utc()).await?;

    tracing::info!(
        handler = "create_account",
        account_id = %account_id,
        status = 201,
        "Responding: account created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateAccountResponse { account_id }),
    ))
}

/// DELETE /api/account/:account_id — remove an account.
/// The schema cascades, so agreements, devices and membership rows go
/// with it.
pub async fn delete_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    tracing::info!(
        handler = "delete_account",
        account_id = %account_id,
        "Handler: DELETE /api/account/:account_id"
    );

    tracing::debug!(handler = "delete_account", "Dispatching to repo.delete_account");
    let deleted = state.accounts.delete_account(&account_id).await?;
    tracing::debug!(handler = "delete_account", deleted, "Repo returned");

    if !deleted {
        return Err(AppError::NotFound("Account not found".into()));
    }

    state
        .activity
        .increment_accounts_deleted(today_utc())
        .await?;

    tracing::info!(
        handler = "delete_account",
        account_id = %account_id,
        status = 200,
        "Responding: account deleted"
    );

    Ok(Json(DeleteResponse { deleted: true }))
}
