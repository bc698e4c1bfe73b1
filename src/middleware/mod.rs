pub mod admin_auth;
pub mod device_auth;
pub mod rate_limit;
