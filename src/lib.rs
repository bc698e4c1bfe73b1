pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod session;
pub mod sqlite_repo;
pub mod util;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use cache::SessionCache;
use middleware::rate_limit::RateLimiter;
use repository::{AccountRepository, ActivityRepository};

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountRepository>,
    pub activity: Arc<dyn ActivityRepository>,
    pub cache: Arc<dyn SessionCache>,
    pub signup_limiter: RateLimiter,
    pub admin_token: Option<String>,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
}

fn device_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/v1/device/:device_id/subscription",
            get(handlers::device::subscription),
        )
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::device_auth::require_device_token,
        ))
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/account", post(handlers::accounts::create_account))
        // Refresh tokens are not access tokens; the handler authenticates
        // the bearer header itself
        .route("/v1/auth/token", get(handlers::device::refresh_token))
}

fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health::health_check))
}

fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/account/activity",
            get(handlers::admin::get_activity),
        )
        .route(
            "/api/account/:account_id",
            delete(handlers::accounts::delete_account),
        )
        .layer(axum_middleware::from_fn_with_state(
            state,
            middleware::admin_auth::require_admin_token,
        ))
}

/// Build the full application router (used by main and tests).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(device_routes(state.clone()))
        .merge(public_routes())
        .merge(health_routes())
        .merge(admin_routes(state.clone()))
        .with_state(state)
}
