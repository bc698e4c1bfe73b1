use serde::{Deserialize, Serialize};

/// Login payload issued to a device and cached under both the access and
/// refresh token keys. This is the value serialized into the cache, so the
/// wire names are part of the storage format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLogin {
    pub uuid: String,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds, echoed to the device.
    pub expiration: u64,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    #[serde(rename = "@type")]
    pub membership_type: String,
}
