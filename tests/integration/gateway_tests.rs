//! Gateway integration tests: descriptors, tiles and the edge cache over HTTP.
//!
//! Tests verify:
//! - Descriptor and tile retrieval for a published pamphlet
//! - Cache misses followed by hits, with storage reads counted
//! - Conditional requests, paging and error status codes
//! - Admin invalidation and deletion

use axum::body::Body;
use axum::http::{Request, StatusCode};

use pamphlet_tiles::RouterConfig;

use super::test_utils::{
    body_bytes, body_json, gateway, get, gradient_png, header, page, publish, router, send,
    solid_png, MemoryStore,
};

const ADMIN_SECRET: &str = "admin-secret";

/// First tile hash of page `index` in a descriptor response.
fn first_hash(descriptor: &serde_json::Value, index: usize) -> String {
    descriptor["pages"][index]["tiles"][0]["hash"]
        .as_str()
        .unwrap()
        .to_string()
}

// =============================================================================
// Descriptor Retrieval
// =============================================================================

#[tokio::test]
async fn test_descriptor_retrieval() {
    let store = MemoryStore::new();
    publish(
        &store,
        "annual-report",
        256,
        vec![page("p1.png", gradient_png(600, 300))],
    )
    .await;

    let app = router(gateway(&store), RouterConfig::new());
    let response = get(&app, "/pamphlets/annual-report/metadata.json").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("application/json"));
    assert_eq!(header(&response, "cache-control"), Some("public, max-age=30"));
    assert_eq!(header(&response, "x-cache-hit"), Some("false"));

    let json = body_json(response).await;
    assert_eq!(json["tile_size"], 256);
    assert_eq!(json["total_pages"], 1);
    assert_eq!(json["has_more"], false);
    assert_eq!(json["has_previous"], false);
    assert!(json["version"].as_u64().unwrap() > 0);

    let first = &json["pages"][0];
    assert_eq!(first["page"], 0);
    assert_eq!(first["width"], 600);
    assert_eq!(first["height"], 300);
    // ceil(600/256) x ceil(300/256) = 3 x 2
    assert_eq!(first["tiles"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_descriptor_served_from_cache() {
    let store = MemoryStore::new();
    publish(
        &store,
        "annual-report",
        256,
        vec![page("p1.png", gradient_png(256, 256))],
    )
    .await;
    store.reset_tracking();

    let gw = gateway(&store);
    let app = router(gw.clone(), RouterConfig::new());

    let first = get(&app, "/pamphlets/annual-report/metadata.json").await;
    assert_eq!(header(&first, "x-cache-hit"), Some("false"));
    let first_body = body_bytes(first).await;
    gw.flush().await;

    let second = get(&app, "/pamphlets/annual-report/metadata.json").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(header(&second, "x-cache-hit"), Some("true"));
    assert_eq!(body_bytes(second).await, first_body);

    assert_eq!(store.get_count(), 1);
}

#[tokio::test]
async fn test_descriptor_paging() {
    let store = MemoryStore::new();
    let pages = (0..5)
        .map(|i| page(&format!("p{}.png", i), solid_png(100, 100, [i * 40, 0, 0, 255])))
        .collect();
    publish(&store, "catalogue", 64, pages).await;

    let app = router(gateway(&store), RouterConfig::new());

    let json = body_json(get(&app, "/pamphlets/catalogue/metadata.json?start=1&limit=2").await).await;
    assert_eq!(json["total_pages"], 5);
    assert_eq!(json["pages"].as_array().unwrap().len(), 2);
    assert_eq!(json["pages"][0]["page"], 1);
    assert_eq!(json["pages"][1]["page"], 2);
    assert_eq!(json["has_previous"], true);
    assert_eq!(json["has_more"], true);

    let json = body_json(get(&app, "/pamphlets/catalogue/metadata.json?start=3").await).await;
    assert_eq!(json["pages"].as_array().unwrap().len(), 2);
    assert_eq!(json["has_more"], false);

    // limit 0 is clamped to 1
    let json = body_json(get(&app, "/pamphlets/catalogue/metadata.json?limit=0").await).await;
    assert_eq!(json["pages"].as_array().unwrap().len(), 1);

    // start past the end yields an empty window
    let json = body_json(get(&app, "/pamphlets/catalogue/metadata.json?start=10").await).await;
    assert!(json["pages"].as_array().unwrap().is_empty());
    assert_eq!(json["has_more"], false);
    assert_eq!(json["has_previous"], true);
}

#[tokio::test]
async fn test_descriptor_not_found() {
    let store = MemoryStore::new();
    let app = router(gateway(&store), RouterConfig::new());

    let response = get(&app, "/pamphlets/missing/metadata.json").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["error"], "not_found");
    assert!(json["message"].is_string());
    assert!(json.get("status").is_none());
}

#[tokio::test]
async fn test_corrupt_descriptor_is_server_error() {
    let store = MemoryStore::new();
    store
        .insert("pamphlets/broken/metadata.json", "{not json")
        .await;

    let app = router(gateway(&store), RouterConfig::new());
    let response = get(&app, "/pamphlets/broken/metadata.json").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_descriptor");
}

#[tokio::test]
async fn test_invalid_pamphlet_id_rejected() {
    let store = MemoryStore::new();
    let app = router(gateway(&store), RouterConfig::new());

    let response = get(&app, "/pamphlets/bad%20id/metadata.json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(store.get_count(), 0);
}

#[tokio::test]
async fn test_non_numeric_paging_is_json_bad_request() {
    let store = MemoryStore::new();
    publish(
        &store,
        "annual-report",
        64,
        vec![page("p1.png", gradient_png(64, 64))],
    )
    .await;
    store.reset_tracking();
    let app = router(gateway(&store), RouterConfig::new());

    for query in ["start=abc", "limit=x", "start=-1", "start=0&limit=ten"] {
        let uri = format!("/pamphlets/annual-report/metadata.json?{}", query);
        let response = get(&app, &uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", query);
        assert_eq!(header(&response, "content-type"), Some("application/json"));

        let json = body_json(response).await;
        assert_eq!(json["error"], "invalid_parameter", "{}", query);
        assert!(json["message"].is_string());
    }
    assert_eq!(store.get_count(), 0);
}

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_tile_retrieval() {
    let store = MemoryStore::new();
    publish(
        &store,
        "annual-report",
        128,
        vec![page("p1.png", gradient_png(200, 100))],
    )
    .await;

    let app = router(gateway(&store), RouterConfig::new());
    let descriptor = body_json(get(&app, "/pamphlets/annual-report/metadata.json").await).await;
    let hash = first_hash(&descriptor, 0);

    let response = get(&app, &format!("/pamphlets/annual-report/tiles/{}.webp", hash)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), Some("image/webp"));
    assert_eq!(
        header(&response, "cache-control"),
        Some("public, max-age=31536000, immutable")
    );
    assert_eq!(header(&response, "etag"), Some(format!("\"{}\"", hash).as_str()));

    let body = body_bytes(response).await;
    let stored = store
        .raw(&format!("pamphlets/annual-report/tiles/{}.webp", hash))
        .await
        .unwrap();
    assert_eq!(body, stored);
    assert_eq!(pamphlet_tiles::content_hash(&body), hash);

    // the bare hash resolves to the same tile
    let response = get(&app, &format!("/pamphlets/annual-report/tiles/{}", hash)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_tile_cache_hit_skips_storage() {
    let store = MemoryStore::new();
    publish(
        &store,
        "annual-report",
        128,
        vec![page("p1.png", gradient_png(128, 128))],
    )
    .await;

    let gw = gateway(&store);
    let app = router(gw.clone(), RouterConfig::new());
    let descriptor = body_json(get(&app, "/pamphlets/annual-report/metadata.json").await).await;
    let uri = format!(
        "/pamphlets/annual-report/tiles/{}.webp",
        first_hash(&descriptor, 0)
    );
    gw.flush().await;
    store.reset_tracking();

    let first = get(&app, &uri).await;
    assert_eq!(header(&first, "x-cache-hit"), Some("false"));
    gw.flush().await;

    for _ in 0..3 {
        let response = get(&app, &uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-cache-hit"), Some("true"));
    }

    assert_eq!(store.get_count(), 1);
}

#[tokio::test]
async fn test_tile_if_none_match() {
    let store = MemoryStore::new();
    publish(
        &store,
        "annual-report",
        128,
        vec![page("p1.png", gradient_png(128, 128))],
    )
    .await;

    let app = router(gateway(&store), RouterConfig::new());
    let descriptor = body_json(get(&app, "/pamphlets/annual-report/metadata.json").await).await;
    let hash = first_hash(&descriptor, 0);
    let uri = format!("/pamphlets/annual-report/tiles/{}.webp", hash);

    let request = Request::builder()
        .uri(&uri)
        .header("if-none-match", format!("\"{}\"", hash))
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(header(&response, "etag"), Some(format!("\"{}\"", hash).as_str()));
    assert!(body_bytes(response).await.is_empty());

    let request = Request::builder()
        .uri(&uri)
        .header("if-none-match", "\"something-else\"")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_tile_errors() {
    let store = MemoryStore::new();
    let app = router(gateway(&store), RouterConfig::new());
    let unknown = "0".repeat(64);

    // well-formed but never published
    let response = get(&app, &format!("/pamphlets/annual-report/tiles/{}.webp", unknown)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(store.get_count(), 1);

    // malformed hashes never reach storage
    store.reset_tracking();
    let uppercase = "A".repeat(64);
    for filename in ["not-a-hash.webp", "ABCDEF.webp", uppercase.as_str()] {
        let response = get(&app, &format!("/pamphlets/annual-report/tiles/{}", filename)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", filename);
    }
    assert_eq!(store.get_count(), 0);

    // tiles are only served in the configured format
    let response = get(&app, &format!("/pamphlets/annual-report/tiles/{}.png", unknown)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_parameter");
}

#[tokio::test]
async fn test_shared_tile_stored_once_and_served_on_every_page() {
    let store = MemoryStore::new();
    let report = publish(
        &store,
        "blank-pages",
        64,
        vec![
            page("p1.png", solid_png(128, 128, [255, 255, 255, 255])),
            page("p2.png", solid_png(128, 128, [255, 255, 255, 255])),
        ],
    )
    .await;

    assert_eq!(report.tiles, 8);
    assert_eq!(report.uploaded, 1);

    let app = router(gateway(&store), RouterConfig::new());
    let descriptor = body_json(get(&app, "/pamphlets/blank-pages/metadata.json").await).await;
    assert_eq!(first_hash(&descriptor, 0), first_hash(&descriptor, 1));

    let response = get(
        &app,
        &format!(
            "/pamphlets/blank-pages/tiles/{}.webp",
            first_hash(&descriptor, 1)
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Admin Routes
// =============================================================================

fn admin_request(method: &str, uri: &str, secret: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(secret) = secret {
        builder = builder.header("authorization", format!("Bearer {}", secret));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_invalidate_exposes_republished_descriptor() {
    let store = MemoryStore::new();
    let first = publish(
        &store,
        "annual-report",
        64,
        vec![page("p1.png", gradient_png(64, 64))],
    )
    .await;

    let gw = gateway(&store);
    let app = router(gw.clone(), RouterConfig::new().with_admin_secret(ADMIN_SECRET));

    let json = body_json(get(&app, "/pamphlets/annual-report/metadata.json").await).await;
    assert_eq!(json["version"].as_u64(), Some(first.version));
    gw.flush().await;

    let second = publish(
        &store,
        "annual-report",
        64,
        vec![
            page("p1.png", gradient_png(64, 64)),
            page("p2.png", gradient_png(64, 64)),
        ],
    )
    .await;
    assert!(second.version > first.version);

    // still the cached copy
    let json = body_json(get(&app, "/pamphlets/annual-report/metadata.json").await).await;
    assert_eq!(json["version"].as_u64(), Some(first.version));

    let response = send(
        &app,
        admin_request(
            "POST",
            "/admin/pamphlets/annual-report/invalidate",
            Some(ADMIN_SECRET),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let json = body_json(get(&app, "/pamphlets/annual-report/metadata.json").await).await;
    assert_eq!(json["version"].as_u64(), Some(second.version));
    assert_eq!(json["total_pages"], 2);
}

#[tokio::test]
async fn test_admin_routes_require_secret() {
    let store = MemoryStore::new();
    let app = router(
        gateway(&store),
        RouterConfig::new().with_admin_secret(ADMIN_SECRET),
    );

    let response = send(
        &app,
        admin_request("POST", "/admin/pamphlets/annual-report/invalidate", None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "missing_token");

    let response = send(
        &app,
        admin_request("DELETE", "/admin/pamphlets/annual-report", Some("wrong")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_token");
}

#[tokio::test]
async fn test_admin_routes_absent_without_secret() {
    let store = MemoryStore::new();
    let app = router(gateway(&store), RouterConfig::new());

    let response = send(
        &app,
        admin_request(
            "POST",
            "/admin/pamphlets/annual-report/invalidate",
            Some(ADMIN_SECRET),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_removes_pamphlet() {
    let store = MemoryStore::new().with_delete_batch(2);
    publish(
        &store,
        "annual-report",
        64,
        vec![page("p1.png", gradient_png(128, 128))],
    )
    .await;
    publish(
        &store,
        "other",
        64,
        vec![page("p1.png", gradient_png(64, 64))],
    )
    .await;

    let gw = gateway(&store);
    let app = router(gw.clone(), RouterConfig::new().with_admin_secret(ADMIN_SECRET));
    let descriptor = body_json(get(&app, "/pamphlets/annual-report/metadata.json").await).await;
    let tile_uri = format!(
        "/pamphlets/annual-report/tiles/{}.webp",
        first_hash(&descriptor, 0)
    );
    assert_eq!(get(&app, &tile_uri).await.status(), StatusCode::OK);
    gw.flush().await;

    let response = send(
        &app,
        admin_request("DELETE", "/admin/pamphlets/annual-report", Some(ADMIN_SECRET)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // 4 tiles + descriptor, in batches of 2
    assert_eq!(body_json(response).await["deleted"], 5);
    assert_eq!(store.delete_calls(), 3);

    // cache entries went with the objects
    assert_eq!(
        get(&app, "/pamphlets/annual-report/metadata.json").await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(get(&app, &tile_uri).await.status(), StatusCode::NOT_FOUND);

    // the other pamphlet is untouched
    assert_eq!(
        get(&app, "/pamphlets/other/metadata.json").await.status(),
        StatusCode::OK
    );
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let store = MemoryStore::new();
    let app = router(gateway(&store), RouterConfig::new());

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}
