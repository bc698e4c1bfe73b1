use std::time::Duration;

use rand::Rng;
use sha2::{Digest, Sha512};

use crate::cache::SessionCache;
use crate::error::AppError;
use crate::models::device::DeviceLogin;

pub const ACCESS_TOKEN_KEY_PREFIX: &str = "device.token.access:";
pub const REFRESH_TOKEN_KEY_PREFIX: &str = "device.token.refresh:";

pub fn access_token_key(token: &str) -> String {
    format!("{ACCESS_TOKEN_KEY_PREFIX}{token}")
}

pub fn refresh_token_key(token: &str) -> String {
    format!("{REFRESH_TOKEN_KEY_PREFIX}{token}")
}

/// SHA-512 over 32 random bytes, hex-encoded: 128 chars, unguessable,
/// opaque to the device.
fn generate_token() -> String {
    let seed: [u8; 32] = rand::thread_rng().gen();
    hex::encode(Sha512::digest(seed))
}

/// Issue a new login session for a device: mint access and refresh tokens
/// and store the serialized payload under both cache keys. The refresh
/// token outlives the access token so a device can come back after the
/// access token lapses.
pub async fn generate_device_login(
    device_id: &str,
    cache: &dyn SessionCache,
    access_ttl: Duration,
    refresh_ttl: Duration,
) -> Result<DeviceLogin, AppError> {
    let login = DeviceLogin {
        uuid: device_id.to_string(),
        access_token: generate_token(),
        refresh_token: generate_token(),
        expiration: access_ttl.as_secs(),
    };

    let payload = serde_json::to_string(&login)
        .map_err(|e| AppError::Internal(format!("failed to serialize login: {e}")))?;

    cache
        .set_with_ttl(&access_token_key(&login.access_token), &payload, access_ttl)
        .await?;
    cache
        .set_with_ttl(
            &refresh_token_key(&login.refresh_token),
            &payload,
            refresh_ttl,
        )
        .await?;

    tracing::debug!(
        device_id = %device_id,
        access_token = %crate::util::token_prefix(&login.access_token),
        "session: device login issued"
    );

    Ok(login)
}
