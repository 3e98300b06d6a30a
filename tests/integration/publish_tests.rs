//! Publish pipeline integration tests.
//!
//! Tests verify:
//! - Storage layout and descriptor-last ordering
//! - Deduplication within and across pages
//! - Failed pages and uploads keep the old descriptor in place
//! - Partial publishing renumbers surviving pages
//! - Unpublishing removes everything in bounded batches

use std::sync::Arc;

use pamphlet_tiles::error::PublishError;
use pamphlet_tiles::pamphlet::{PamphletDescriptor, Publisher};
use pamphlet_tiles::tile::{content_hash, TileFormat};

use super::test_utils::{
    gradient_png, page, publish, publish_options, solid_png, MemoryStore,
};

async fn stored_descriptor(store: &MemoryStore, pamphlet_id: &str) -> PamphletDescriptor {
    let raw = store
        .raw(&format!("pamphlets/{}/metadata.json", pamphlet_id))
        .await
        .unwrap();
    serde_json::from_slice(&raw).unwrap()
}

#[tokio::test]
async fn test_publish_layout_and_descriptor_last() {
    let store = MemoryStore::new();
    let report = publish(
        &store,
        "annual-report",
        100,
        vec![
            page("p1.png", gradient_png(250, 120)),
            page("p2.png", gradient_png(90, 90)),
        ],
    )
    .await;

    // 3x2 grid + 1x1 grid
    assert_eq!(report.pages, 2);
    assert_eq!(report.tiles, 7);
    assert!(report.failures.is_empty());

    let order = store.put_order().await;
    assert_eq!(
        order.last().map(String::as_str),
        Some("pamphlets/annual-report/metadata.json")
    );
    assert!(order[..order.len() - 1]
        .iter()
        .all(|k| k.starts_with("pamphlets/annual-report/tiles/") && k.ends_with(".webp")));

    let descriptor = stored_descriptor(&store, "annual-report").await;
    assert_eq!(descriptor.version, report.version);
    assert_eq!(descriptor.tile_size, 100);
    assert!(descriptor.validate().is_ok());
    assert_eq!(descriptor.pages[0].tiles.len(), 6);
    assert_eq!(descriptor.pages[1].tiles.len(), 1);

    // every referenced hash is stored under its own content hash
    for hash in descriptor.tile_hashes() {
        let body = store
            .raw(&format!("pamphlets/annual-report/tiles/{}.webp", hash))
            .await
            .unwrap();
        assert_eq!(content_hash(&body), hash);
    }
}

#[tokio::test]
async fn test_publish_is_deterministic() {
    let first = MemoryStore::new();
    let second = MemoryStore::new();
    let image = gradient_png(300, 200);

    publish(&first, "a", 128, vec![page("p1.png", image.clone())]).await;
    publish(&second, "a", 128, vec![page("p1.png", image)]).await;

    let first = stored_descriptor(&first, "a").await;
    let second = stored_descriptor(&second, "a").await;
    assert_eq!(first.pages, second.pages);
}

#[tokio::test]
async fn test_identical_tiles_uploaded_once() {
    let store = MemoryStore::new();
    let white = [255, 255, 255, 255];
    let report = publish(
        &store,
        "blank",
        64,
        vec![
            page("p1.png", solid_png(256, 128, white)),
            page("p2.png", solid_png(128, 128, white)),
        ],
    )
    .await;

    assert_eq!(report.tiles, 12);
    assert_eq!(report.uploaded, 1);

    let tile_puts = store
        .put_order()
        .await
        .into_iter()
        .filter(|k| k.contains("/tiles/"))
        .count();
    assert_eq!(tile_puts, 1);
}

#[tokio::test]
async fn test_jpeg_publish_uses_jpg_keys() {
    let store = MemoryStore::new();
    let publisher = Publisher::new(
        Arc::new(store.clone()),
        publish_options(64, TileFormat::Jpeg),
    );

    publisher
        .publish("photos", vec![page("p1.png", gradient_png(64, 64))])
        .await
        .unwrap();

    let keys = store.keys().await;
    assert!(keys
        .iter()
        .filter(|k| k.contains("/tiles/"))
        .all(|k| k.ends_with(".jpg")));
}

#[tokio::test]
async fn test_undecodable_page_keeps_previous_descriptor() {
    let store = MemoryStore::new();
    let original = publish(
        &store,
        "annual-report",
        64,
        vec![page("p1.png", gradient_png(64, 64))],
    )
    .await;

    let publisher = Publisher::new(
        Arc::new(store.clone()),
        publish_options(64, TileFormat::WebP),
    );
    let result = publisher
        .publish(
            "annual-report",
            vec![
                page("p1.png", gradient_png(64, 64)),
                page("p2.png", b"not an image".to_vec()),
            ],
        )
        .await;

    match result {
        Err(PublishError::Incomplete { failures }) => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].artifact.contains("p2.png"));
        }
        other => panic!("expected incomplete publish, got {:?}", other),
    }

    let descriptor = stored_descriptor(&store, "annual-report").await;
    assert_eq!(descriptor.version, original.version);
}

#[tokio::test]
async fn test_failed_upload_blocks_descriptor() {
    let store = MemoryStore::new();
    store.fail_puts_ending_with(".webp").await;

    let publisher = Publisher::new(
        Arc::new(store.clone()),
        publish_options(64, TileFormat::WebP),
    );
    let result = publisher
        .publish("annual-report", vec![page("p1.png", gradient_png(128, 64))])
        .await;

    match result {
        Err(PublishError::Incomplete { failures }) => assert_eq!(failures.len(), 2),
        other => panic!("expected incomplete publish, got {:?}", other),
    }
    assert!(store
        .raw("pamphlets/annual-report/metadata.json")
        .await
        .is_none());
}

#[tokio::test]
async fn test_allow_partial_renumbers_pages() {
    let store = MemoryStore::new();
    let mut options = publish_options(64, TileFormat::WebP);
    options.allow_partial = true;
    let publisher = Publisher::new(Arc::new(store.clone()), options);

    let report = publisher
        .publish(
            "annual-report",
            vec![
                page("p1.png", gradient_png(64, 64)),
                page("p2.png", b"garbage".to_vec()),
                page("p3.png", solid_png(64, 64, [0, 0, 255, 255])),
            ],
        )
        .await
        .unwrap();

    assert_eq!(report.pages, 2);
    assert_eq!(report.failures.len(), 1);

    let descriptor = stored_descriptor(&store, "annual-report").await;
    let indices: Vec<u32> = descriptor.pages.iter().map(|p| p.page).collect();
    assert_eq!(indices, vec![0, 1]);
    assert!(descriptor.validate().is_ok());
}

#[tokio::test]
async fn test_many_pages_span_chunks() {
    let store = MemoryStore::new();
    let pages = (0..20u8)
        .map(|i| page(&format!("p{}.png", i), solid_png(32, 32, [i, i, i, 255])))
        .collect();

    let report = publish(&store, "long-read", 32, pages).await;
    assert_eq!(report.pages, 20);
    assert_eq!(report.uploaded, 20);

    let descriptor = stored_descriptor(&store, "long-read").await;
    for (index, page) in descriptor.pages.iter().enumerate() {
        assert_eq!(page.page as usize, index);
    }
}

#[tokio::test]
async fn test_unpublish_removes_everything_in_batches() {
    let store = MemoryStore::new().with_delete_batch(3);
    publish(
        &store,
        "annual-report",
        32,
        vec![page("p1.png", gradient_png(128, 64))],
    )
    .await;
    publish(
        &store,
        "other",
        32,
        vec![page("p1.png", gradient_png(32, 32))],
    )
    .await;

    let publisher = Publisher::new(
        Arc::new(store.clone()),
        publish_options(32, TileFormat::WebP),
    );
    let deleted = publisher.unpublish("annual-report").await.unwrap();

    // 8 tiles + descriptor in batches of 3
    assert_eq!(deleted, 9);
    assert_eq!(store.delete_calls(), 3);
    assert!(store
        .keys()
        .await
        .iter()
        .all(|k| k.starts_with("pamphlets/other/")));

    // nothing left to delete the second time
    assert_eq!(publisher.unpublish("annual-report").await.unwrap(), 0);
}

#[tokio::test]
async fn test_publish_rejects_bad_input() {
    let store = MemoryStore::new();
    let publisher = Publisher::new(
        Arc::new(store.clone()),
        publish_options(64, TileFormat::WebP),
    );

    let result = publisher
        .publish("../escape", vec![page("p1.png", gradient_png(8, 8))])
        .await;
    assert!(matches!(result, Err(PublishError::InvalidParameter { .. })));

    let result = publisher.publish("empty", vec![]).await;
    assert!(matches!(result, Err(PublishError::InvalidParameter { .. })));

    assert!(store.keys().await.is_empty());
}
