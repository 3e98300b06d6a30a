//! Durable object storage.
//!
//! Tiles and descriptors live in an object store under a fixed layout:
//!
//! ```text
//! pamphlets/{pamphlet_id}/tiles/{hash}.{ext}    immutable once written
//! pamphlets/{pamphlet_id}/metadata.json         replaced on republish
//! ```
//!
//! [`ObjectStore`] abstracts the backend so the gateway and publisher can be
//! exercised against an in-memory store in tests and against S3 in
//! production ([`S3ObjectStore`]).

mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::StoreError;
use crate::tile::TileFormat;

pub use s3::{create_s3_client, S3ObjectStore};

/// Root prefix of every pamphlet artifact.
pub const PAMPHLETS_PREFIX: &str = "pamphlets";

/// File name of the descriptor inside a pamphlet prefix.
pub const DESCRIPTOR_FILE: &str = "metadata.json";

/// Content type stored with descriptors.
pub const DESCRIPTOR_CONTENT_TYPE: &str = "application/json";

/// Storage-side cap on keys per batch delete (S3 DeleteObjects limit).
pub const DEFAULT_DELETE_BATCH: usize = 1000;

/// Longest accepted pamphlet id.
pub const MAX_PAMPHLET_ID_LEN: usize = 128;

// =============================================================================
// ObjectStore Trait
// =============================================================================

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Keys in this page
    pub keys: Vec<String>,

    /// Cursor for the next page, `None` once the listing is exhausted
    pub next_cursor: Option<String>,
}

/// Object storage used as the origin behind the edge cache.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a whole object. Missing keys return [`StoreError::NotFound`].
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Store an object, replacing any previous one at `key`.
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StoreError>;

    /// List up to `limit` keys under `prefix`, resuming from `cursor`.
    async fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ListPage, StoreError>;

    /// Delete a batch of keys. `keys.len()` never exceeds [`Self::max_delete_batch`].
    async fn delete_batch(&self, keys: &[String]) -> Result<(), StoreError>;

    /// Largest batch the backend accepts in one delete call.
    fn max_delete_batch(&self) -> usize {
        DEFAULT_DELETE_BATCH
    }
}

// =============================================================================
// Key Layout
// =============================================================================

/// Prefix holding every artifact of a pamphlet, with trailing slash.
pub fn pamphlet_prefix(pamphlet_id: &str) -> String {
    format!("{}/{}/", PAMPHLETS_PREFIX, pamphlet_id)
}

/// Storage key of a tile.
pub fn tile_key(pamphlet_id: &str, hash: &str, format: TileFormat) -> String {
    format!(
        "{}/{}/tiles/{}.{}",
        PAMPHLETS_PREFIX,
        pamphlet_id,
        hash,
        format.extension()
    )
}

/// Storage key of a pamphlet descriptor.
pub fn descriptor_key(pamphlet_id: &str) -> String {
    format!("{}/{}/{}", PAMPHLETS_PREFIX, pamphlet_id, DESCRIPTOR_FILE)
}

/// Check that a pamphlet id is safe to embed in storage keys and URLs.
pub fn validate_pamphlet_id(pamphlet_id: &str) -> Result<(), String> {
    if pamphlet_id.is_empty() {
        return Err("pamphlet id must not be empty".to_string());
    }
    if pamphlet_id.len() > MAX_PAMPHLET_ID_LEN {
        return Err(format!(
            "pamphlet id is longer than {} characters",
            MAX_PAMPHLET_ID_LEN
        ));
    }
    if !pamphlet_id
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    {
        return Err(format!(
            "pamphlet id '{}' may only contain ASCII letters, digits, '-' and '_'",
            pamphlet_id
        ));
    }
    Ok(())
}

// =============================================================================
// Bulk Delete
// =============================================================================

/// Delete every object under `prefix`, one listing page at a time.
///
/// Each page is at most `store.max_delete_batch()` keys so a single delete
/// call never exceeds the backend cap. Returns the number of deleted keys.
pub async fn delete_prefix<S>(store: &S, prefix: &str) -> Result<usize, StoreError>
where
    S: ObjectStore + ?Sized,
{
    let batch = store.max_delete_batch().max(1);
    let mut cursor: Option<String> = None;
    let mut deleted = 0;

    loop {
        let page = store.list(prefix, cursor.as_deref(), batch).await?;

        for chunk in page.keys.chunks(batch) {
            store.delete_batch(chunk).await?;
            deleted += chunk.len();
        }
        debug!(prefix = prefix, deleted = deleted, "Deleted batch");

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(deleted)
}

// =============================================================================
// Tests
// =============================================================================
