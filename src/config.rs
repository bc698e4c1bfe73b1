use std::env;
use std::fmt;
use std::str::FromStr;

/// Deployment profile. Selected by the required APP_ENVIRONMENT variable;
/// an unset or unknown value aborts startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Test,
    Prod,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Environment::Dev),
            "test" => Ok(Environment::Test),
            "prod" => Ok(Environment::Prod),
            other => Err(ConfigError(format!(
                "no configuration defined for the \"{other}\" environment"
            ))),
        }
    }
}

#[derive(Debug)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

pub struct Config {
    pub environment: Environment,
    pub port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub cors_origins: Vec<String>,
    /// Bearer token for the admin routes. When unset those routes answer 404.
    pub admin_token: Option<String>,
    pub access_token_ttl_secs: u64,
    pub refresh_token_ttl_secs: u64,
    pub signup_burst: u32,
    pub signup_per_minute: u32,
    pub max_payload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment: Environment = env::var("APP_ENVIRONMENT")
            .map_err(|_| ConfigError("the APP_ENVIRONMENT variable is not set".to_string()))?
            .parse()?;

        Ok(Self {
            environment,
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:nimbus-account.db".to_string()),
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            cors_origins: env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:5173".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            access_token_ttl_secs: env::var("ACCESS_TOKEN_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(86_400), // one day
            refresh_token_ttl_secs: env::var("REFRESH_TOKEN_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30 * 86_400),
            signup_burst: env::var("SIGNUP_BURST")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            signup_per_minute: env::var("SIGNUP_PER_MINUTE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(6),
            max_payload_bytes: env::var("MAX_PAYLOAD_BYTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(65_536), // 64 KiB
        })
    }
}
