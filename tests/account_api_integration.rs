use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use nimbus_account::cache::{MemoryCache, SessionCache};
use nimbus_account::middleware::rate_limit::RateLimiter;
use nimbus_account::models::account::NewAccount;
use nimbus_account::repository::{AccountRepository, ActivityRepository};
use nimbus_account::session::{generate_device_login, refresh_token_key};
use nimbus_account::sqlite_repo::SqliteRepository;
use nimbus_account::util::today_utc;
use nimbus_account::{build_app, db, AppState};

const ACCESS_TTL: Duration = Duration::from_secs(86_400);
const REFRESH_TTL: Duration = Duration::from_secs(30 * 86_400);
const ADMIN_TOKEN: &str = "test-admin-token";

// -- Helpers ------------------------------------------------------------------

struct TestApp {
    app: axum::Router,
    repo: Arc<SqliteRepository>,
    cache: Arc<MemoryCache>,
}

async fn setup() -> TestApp {
    setup_with(RateLimiter::new(30, 60), Some(ADMIN_TOKEN)).await
}

async fn setup_with(limiter: RateLimiter, admin_token: Option<&str>) -> TestApp {
    let pool = db::init_pool("sqlite::memory:").await.unwrap();
    let repo = Arc::new(SqliteRepository::new(pool));
    let cache = Arc::new(MemoryCache::new());
    let state = AppState {
        accounts: repo.clone(),
        activity: repo.clone(),
        cache: cache.clone(),
        signup_limiter: limiter,
        admin_token: admin_token.map(|t| t.to_string()),
        access_token_ttl: ACCESS_TTL,
        refresh_token_ttl: REFRESH_TTL,
    };
    TestApp {
        app: build_app(state),
        repo,
        cache,
    }
}

/// Send a JSON request; `auth_header` is the full Authorization value
/// (e.g. "Bearer <token>"). Empty response bodies come back as Null.
async fn json_request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    auth_header: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let has_body = body.is_some();
    let body_str = body.map(|b| b.to_string()).unwrap_or_default();
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(value) = auth_header {
        builder = builder.header("authorization", value);
    }
    if has_body {
        builder = builder.header("content-type", "application/json");
    }

    let req = builder.body(Body::from(body_str)).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn b64(s: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(s.as_bytes())
}

fn new_account_request(email: &str, password: &str) -> Value {
    json!({
        "termsOfUse": true,
        "privacyPolicy": true,
        "login": {
            "federatedPlatform": null,
            "federatedToken": null,
            "email": b64(email),
            "password": b64(password),
        }
    })
}

/// Insert an account directly, the way scenario fixtures do.
async fn add_fixture_account(repo: &SqliteRepository) -> String {
    repo.add_account(&NewAccount {
        email_address: Some(format!("fixture-{}@example.com", Uuid::new_v4())),
        password_hash: Some("irrelevant".to_string()),
        federated_platform: None,
        accept_date: today_utc(),
    })
    .await
    .unwrap()
}

// -- Account creation ---------------------------------------------------------

#[tokio::test]
async fn test_create_account_adds_two_agreements_dated_today() {
    let t = setup().await;

    let (status, body) = json_request(
        &t.app,
        "POST",
        "/api/account",
        None,
        Some(new_account_request("bar@example.com", "secret")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["accountId"].as_str().is_some());

    let account = t
        .repo
        .get_account_by_email("bar@example.com")
        .await
        .unwrap()
        .expect("account should exist");
    assert_eq!(account.email_address.as_deref(), Some("bar@example.com"));
    assert_eq!(account.agreements.len(), 2);

    let today = today_utc();
    let mut types: Vec<String> = account
        .agreements
        .iter()
        .map(|a| {
            assert_eq!(a.accept_date, today);
            serde_json::to_value(a.agreement_type)
                .unwrap()
                .as_str()
                .unwrap()
                .to_string()
        })
        .collect();
    types.sort();
    assert_eq!(types, vec!["Privacy Policy", "Terms of Use"]);
}

#[tokio::test]
async fn test_create_account_increments_added_counter_from_empty() {
    let t = setup().await;
    let today = today_utc();

    assert!(t.repo.get_activity_by_date(today).await.unwrap().is_none());

    let (status, _) = json_request(
        &t.app,
        "POST",
        "/api/account",
        None,
        Some(new_account_request("first@example.com", "pw")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let activity = t
        .repo
        .get_activity_by_date(today)
        .await
        .unwrap()
        .expect("activity row should exist");
    assert_eq!(activity.accounts_added, 1);
    assert_eq!(activity.accounts_deleted, 0);
}

#[tokio::test]
async fn test_create_account_increments_existing_counter() {
    let t = setup().await;
    let today = today_utc();

    // Pre-existing row for today
    t.repo.increment_accounts_added(today).await.unwrap();

    let (status, _) = json_request(
        &t.app,
        "POST",
        "/api/account",
        None,
        Some(new_account_request("second@example.com", "pw")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let activity = t.repo.get_activity_by_date(today).await.unwrap().unwrap();
    assert_eq!(activity.accounts_added, 2);
}

#[tokio::test]
async fn test_create_account_requires_both_agreements() {
    let t = setup().await;

    for (terms, privacy) in [(false, true), (true, false)] {
        let mut body = new_account_request("flags@example.com", "pw");
        body["termsOfUse"] = json!(terms);
        body["privacyPolicy"] = json!(privacy);

        let (status, resp) = json_request(&t.app, "POST", "/api/account", None, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(resp["error"].as_str().unwrap().contains("accepted"));
    }
}

#[tokio::test]
async fn test_create_account_requires_some_credentials() {
    let t = setup().await;

    let body = json!({
        "termsOfUse": true,
        "privacyPolicy": true,
        "login": {
            "federatedPlatform": null,
            "federatedToken": null,
        }
    });
    let (status, _) = json_request(&t.app, "POST", "/api/account", None, Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_federated_account_without_email() {
    let t = setup().await;

    let body = json!({
        "termsOfUse": true,
        "privacyPolicy": true,
        "login": {
            "federatedPlatform": "Google",
            "federatedToken": "federated-token-value",
        }
    });
    let (status, resp) = json_request(&t.app, "POST", "/api/account", None, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED);

    let account_id = resp["accountId"].as_str().unwrap();
    let account = t
        .repo
        .get_account_by_id(account_id)
        .await
        .unwrap()
        .expect("federated account should exist");
    assert_eq!(account.email_address, None);
    assert_eq!(account.federated_platform.as_deref(), Some("Google"));
    assert_eq!(account.agreements.len(), 2);
}

#[tokio::test]
async fn test_create_account_duplicate_email_conflicts() {
    let t = setup().await;

    let (status, _) = json_request(
        &t.app,
        "POST",
        "/api/account",
        None,
        Some(new_account_request("dup@example.com", "pw")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, resp) = json_request(
        &t.app,
        "POST",
        "/api/account",
        None,
        Some(new_account_request("dup@example.com", "pw")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(resp["error"].as_str().unwrap().contains("registered"));
}

#[tokio::test]
async fn test_create_account_rate_limited() {
    let t = setup_with(RateLimiter::new(1, 1), Some(ADMIN_TOKEN)).await;

    let (status, _) = json_request(
        &t.app,
        "POST",
        "/api/account",
        None,
        Some(new_account_request("limited@example.com", "pw")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Same signup identity immediately again
    let (status, _) = json_request(
        &t.app,
        "POST",
        "/api/account",
        None,
        Some(new_account_request("limited@example.com", "pw")),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

// -- Token refresh ------------------------------------------------------------

#[tokio::test]
async fn test_refresh_token_roundtrip_recovers_device_id() {
    let t = setup().await;
    let device_id = Uuid::new_v4().to_string();

    let login = generate_device_login(&device_id, t.cache.as_ref(), ACCESS_TTL, REFRESH_TTL)
        .await
        .unwrap();

    let (status, body) = json_request(
        &t.app,
        "GET",
        "/v1/auth/token",
        Some(&format!("Bearer {}", login.refresh_token)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uuid"].as_str().unwrap(), device_id);
    assert_ne!(body["accessToken"].as_str().unwrap(), login.access_token);
    assert_ne!(body["refreshToken"].as_str().unwrap(), login.refresh_token);
    assert_eq!(body["expiration"].as_u64().unwrap(), ACCESS_TTL.as_secs());
}

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let t = setup().await;
    let device_id = Uuid::new_v4().to_string();

    let login = generate_device_login(&device_id, t.cache.as_ref(), ACCESS_TTL, REFRESH_TTL)
        .await
        .unwrap();
    let header = format!("Bearer {}", login.refresh_token);

    let (status, _) = json_request(&t.app, "GET", "/v1/auth/token", Some(&header), None).await;
    assert_eq!(status, StatusCode::OK);

    // The redeemed token is gone from the cache
    let stored = t
        .cache
        .get(&refresh_token_key(&login.refresh_token))
        .await
        .unwrap();
    assert_eq!(stored, None);

    // A second redemption fails with an empty 401
    let (status, body) = json_request(&t.app, "GET", "/v1/auth/token", Some(&header), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_refresh_chained_tokens_stay_valid() {
    let t = setup().await;
    let device_id = Uuid::new_v4().to_string();

    let login = generate_device_login(&device_id, t.cache.as_ref(), ACCESS_TTL, REFRESH_TTL)
        .await
        .unwrap();

    let (status, first) = json_request(
        &t.app,
        "GET",
        "/v1/auth/token",
        Some(&format!("Bearer {}", login.refresh_token)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The freshly issued refresh token is itself redeemable
    let next_refresh = first["refreshToken"].as_str().unwrap();
    let (status, second) = json_request(
        &t.app,
        "GET",
        "/v1/auth/token",
        Some(&format!("Bearer {next_refresh}")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["uuid"].as_str().unwrap(), device_id);
}

#[tokio::test]
async fn test_refresh_without_authorization_header() {
    let t = setup().await;
    let (status, body) = json_request(&t.app, "GET", "/v1/auth/token", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_refresh_with_non_bearer_header() {
    let t = setup().await;
    let (status, body) = json_request(
        &t.app,
        "GET",
        "/v1/auth/token",
        Some("Token abcdef123456"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_refresh_with_unknown_token() {
    let t = setup().await;
    let (status, body) = json_request(
        &t.app,
        "GET",
        "/v1/auth/token",
        Some("Bearer does-not-exist"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, Value::Null);
}

// -- Device subscription ------------------------------------------------------

#[tokio::test]
async fn test_subscription_defaults_to_free() {
    let t = setup().await;
    let account_id = add_fixture_account(&t.repo).await;
    let device_id = t.repo.add_device(&account_id, "kitchen").await.unwrap();

    let login = generate_device_login(&device_id, t.cache.as_ref(), ACCESS_TTL, REFRESH_TTL)
        .await
        .unwrap();

    let (status, body) = json_request(
        &t.app,
        "GET",
        &format!("/v1/device/{device_id}/subscription"),
        Some(&format!("Bearer {}", login.access_token)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["@type"].as_str().unwrap(), "free");
}

#[tokio::test]
async fn test_subscription_reports_membership_type() {
    let t = setup().await;
    let account_id = add_fixture_account(&t.repo).await;
    let device_id = t.repo.add_device(&account_id, "living room").await.unwrap();
    t.repo
        .add_membership(&account_id, "Monthly Membership", today_utc())
        .await
        .unwrap();

    let login = generate_device_login(&device_id, t.cache.as_ref(), ACCESS_TTL, REFRESH_TTL)
        .await
        .unwrap();

    let (status, body) = json_request(
        &t.app,
        "GET",
        &format!("/v1/device/{device_id}/subscription"),
        Some(&format!("Bearer {}", login.access_token)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["@type"].as_str().unwrap(), "Monthly Membership");
}

#[tokio::test]
async fn test_subscription_no_owning_account_is_no_content() {
    let t = setup().await;
    // A session can exist for a device no account has registered yet
    let device_id = Uuid::new_v4().to_string();
    let login = generate_device_login(&device_id, t.cache.as_ref(), ACCESS_TTL, REFRESH_TTL)
        .await
        .unwrap();

    let (status, body) = json_request(
        &t.app,
        "GET",
        &format!("/v1/device/{device_id}/subscription"),
        Some(&format!("Bearer {}", login.access_token)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_subscription_rejects_session_for_other_device() {
    let t = setup().await;
    let account_id = add_fixture_account(&t.repo).await;
    let device_id = t.repo.add_device(&account_id, "bedroom").await.unwrap();

    // Session issued to a different device
    let other_login = generate_device_login(
        &Uuid::new_v4().to_string(),
        t.cache.as_ref(),
        ACCESS_TTL,
        REFRESH_TTL,
    )
    .await
    .unwrap();

    let (status, _) = json_request(
        &t.app,
        "GET",
        &format!("/v1/device/{device_id}/subscription"),
        Some(&format!("Bearer {}", other_login.access_token)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_subscription_requires_access_token() {
    let t = setup().await;
    let device_id = Uuid::new_v4().to_string();

    let (status, _) = json_request(
        &t.app,
        "GET",
        &format!("/v1/device/{device_id}/subscription"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = json_request(
        &t.app,
        "GET",
        &format!("/v1/device/{device_id}/subscription"),
        Some("Bearer not-a-real-access-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// -- Account deletion ---------------------------------------------------------

#[tokio::test]
async fn test_delete_account_cascades_and_counts() {
    let t = setup().await;
    let admin = format!("Bearer {ADMIN_TOKEN}");

    let (status, resp) = json_request(
        &t.app,
        "POST",
        "/api/account",
        None,
        Some(new_account_request("doomed@example.com", "pw")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let account_id = resp["accountId"].as_str().unwrap().to_string();
    let device_id = t.repo.add_device(&account_id, "attic").await.unwrap();

    let (status, body) = json_request(
        &t.app,
        "DELETE",
        &format!("/api/account/{account_id}"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);

    // Account and everything hanging off it is gone
    assert!(t
        .repo
        .get_account_by_email("doomed@example.com")
        .await
        .unwrap()
        .is_none());
    assert!(t
        .repo
        .get_account_by_device_id(&device_id)
        .await
        .unwrap()
        .is_none());

    let activity = t
        .repo
        .get_activity_by_date(today_utc())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(activity.accounts_added, 1);
    assert_eq!(activity.accounts_deleted, 1);

    // Deleting again is a 404
    let (status, _) = json_request(
        &t.app,
        "DELETE",
        &format!("/api/account/{account_id}"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_routes_require_admin_token() {
    let t = setup().await;

    let (status, _) = json_request(&t.app, "DELETE", "/api/account/some-id", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = json_request(
        &t.app,
        "DELETE",
        "/api/account/some-id",
        Some("Bearer wrong-token"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_hidden_when_unconfigured() {
    let t = setup_with(RateLimiter::new(30, 60), None).await;

    let (status, _) = json_request(
        &t.app,
        "GET",
        "/api/account/activity",
        Some(&format!("Bearer {ADMIN_TOKEN}")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- Activity endpoint --------------------------------------------------------

#[tokio::test]
async fn test_activity_endpoint_reports_daily_counters() {
    let t = setup().await;
    let admin = format!("Bearer {ADMIN_TOKEN}");

    // Nothing recorded yet
    let (status, _) = json_request(&t.app, "GET", "/api/account/activity", Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = json_request(
        &t.app,
        "POST",
        "/api/account",
        None,
        Some(new_account_request("active@example.com", "pw")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) =
        json_request(&t.app, "GET", "/api/account/activity", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accountsAdded"], 1);
    assert_eq!(body["accountsDeleted"], 0);
    assert_eq!(body["activityDate"].as_str().unwrap(), today_utc().to_string());

    // Explicit date with no data
    let (status, _) = json_request(
        &t.app,
        "GET",
        "/api/account/activity?date=2000-01-01",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- Health -------------------------------------------------------------------

#[tokio::test]
async fn test_health_check() {
    let t = setup().await;
    let (status, body) = json_request(&t.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
