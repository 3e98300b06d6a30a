//! Access token integration tests.
//!
//! Tests verify:
//! - Tokens are accepted from the Authorization header and the query string
//! - Missing, malformed, foreign and expired tokens are rejected
//! - Health stays public and public mode needs no token

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{Request, StatusCode};

use pamphlet_tiles::server::auth::{AccessTokenService, DEFAULT_TOKEN_MAX_AGE};
use pamphlet_tiles::RouterConfig;

use super::test_utils::{
    body_json, gateway, get, gradient_png, page, publish, router, send, MemoryStore,
};

const TEST_SECRET: &str = "test-secret-key-for-hmac-signing";
const PAMPHLET: &str = "annual-report";

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn tokens() -> AccessTokenService {
    AccessTokenService::new(TEST_SECRET)
}

async fn gated_app() -> (MemoryStore, axum::Router) {
    let store = MemoryStore::new();
    publish(
        &store,
        PAMPHLET,
        64,
        vec![page("p1.png", gradient_png(64, 64))],
    )
    .await;

    let app = router(
        gateway(&store),
        RouterConfig::new().with_token_auth(tokens(), DEFAULT_TOKEN_MAX_AGE),
    );
    (store, app)
}

fn with_bearer(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

// =============================================================================
// Valid Tokens
// =============================================================================

#[tokio::test]
async fn test_bearer_token_accepted() {
    let (_, app) = gated_app().await;
    let issued = tokens().issue(PAMPHLET, Duration::from_secs(600));

    let response = send(
        &app,
        with_bearer("/pamphlets/annual-report/metadata.json", &issued.token),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["total_pages"], 1);
}

#[tokio::test]
async fn test_query_token_accepted_for_tiles() {
    let (store, app) = gated_app().await;
    let issued = tokens().issue(PAMPHLET, Duration::from_secs(600));

    let tile_key = store
        .keys()
        .await
        .into_iter()
        .find(|k| k.contains("/tiles/"))
        .unwrap();
    let filename = tile_key.rsplit('/').next().unwrap();

    let response = get(
        &app,
        &format!(
            "/pamphlets/annual-report/tiles/{}?token={}",
            filename, issued.token
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_query_token_combined_with_paging() {
    let (_, app) = gated_app().await;
    let issued = tokens().issue(PAMPHLET, Duration::from_secs(600));

    let response = get(
        &app,
        &format!(
            "/pamphlets/annual-report/metadata.json?start=0&limit=1&token={}",
            issued.token
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_token_from_previous_bucket_accepted() {
    let (_, app) = gated_app().await;
    let issued = tokens().issue_at(PAMPHLET, Duration::from_secs(600), now() - 600);

    let response = send(
        &app,
        with_bearer("/pamphlets/annual-report/metadata.json", &issued.token),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Rejected Tokens
// =============================================================================

#[tokio::test]
async fn test_missing_token_rejected() {
    let (_, app) = gated_app().await;

    let response = get(&app, "/pamphlets/annual-report/metadata.json").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "missing_token");
}

#[tokio::test]
async fn test_malformed_token_rejected() {
    let (_, app) = gated_app().await;

    for token in ["no-dot", "abc.def", "1200.not-hex"] {
        let response = send(
            &app,
            with_bearer("/pamphlets/annual-report/metadata.json", token),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", token);
        assert_eq!(body_json(response).await["error"], "malformed_token");
    }
}

#[tokio::test]
async fn test_token_for_other_pamphlet_rejected() {
    let (_, app) = gated_app().await;
    let issued = tokens().issue("someone-else", Duration::from_secs(600));

    let response = send(
        &app,
        with_bearer("/pamphlets/annual-report/metadata.json", &issued.token),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_token");
}

#[tokio::test]
async fn test_token_from_different_key_rejected() {
    let (_, app) = gated_app().await;
    let issued = AccessTokenService::new("another-secret").issue(PAMPHLET, Duration::from_secs(600));

    let response = send(
        &app,
        with_bearer("/pamphlets/annual-report/metadata.json", &issued.token),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_token");
}

#[tokio::test]
async fn test_expired_token_rejected() {
    let (_, app) = gated_app().await;
    let stale = now() - 2 * DEFAULT_TOKEN_MAX_AGE.as_secs();
    let issued = tokens().issue_at(PAMPHLET, Duration::from_secs(600), stale);

    let response = send(
        &app,
        with_bearer("/pamphlets/annual-report/metadata.json", &issued.token),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "token_expired");
}

#[tokio::test]
async fn test_duplicate_query_token_rejected() {
    let (_, app) = gated_app().await;
    let issued = tokens().issue(PAMPHLET, Duration::from_secs(600));

    let response = get(
        &app,
        &format!(
            "/pamphlets/annual-report/metadata.json?token={}&token={}",
            issued.token, issued.token
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "malformed_token");
}

// =============================================================================
// Public Routes
// =============================================================================

#[tokio::test]
async fn test_health_endpoint_public_when_gated() {
    let (_, app) = gated_app().await;

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_public_mode_needs_no_token() {
    let store = MemoryStore::new();
    publish(
        &store,
        PAMPHLET,
        64,
        vec![page("p1.png", gradient_png(64, 64))],
    )
    .await;
    let app = router(gateway(&store), RouterConfig::new());

    let response = get(&app, "/pamphlets/annual-report/metadata.json").await;
    assert_eq!(response.status(), StatusCode::OK);
}
