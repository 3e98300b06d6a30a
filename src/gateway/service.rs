//! Read-through gateway in front of the object store.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Gateway                              │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │            get_tile() / get_descriptor()                │    │
//! │  │  1. Validate ids      3. Miss: fetch from storage       │    │
//! │  │  2. Check cache       4. Respond, populate in background│    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌───────────┐      ┌──────────────┐     ┌───────────────┐    │
//! │    │ EdgeCache │      │ ObjectStore  │     │ JoinSet       │    │
//! │    │           │      │ (S3)         │     │ (cache writes)│    │
//! │    └───────────┘      └──────────────┘     └───────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tiles are immutable per hash and cached for a long time. The descriptor is
//! the only mutable document: it gets a short TTL and can be invalidated
//! explicitly. Readers already holding a cached copy keep it until their own
//! entry expires.
//!
//! Background writes carry the pamphlet's cache generation from before the
//! storage read, so a fill racing an invalidation or delete is discarded.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::pamphlet::{PageRange, PamphletDescriptor};
use crate::store::{
    delete_prefix, descriptor_key, pamphlet_prefix, tile_key, validate_pamphlet_id, ObjectStore,
    DESCRIPTOR_CONTENT_TYPE,
};
use crate::tile::{is_content_hash, TileFormat};

use super::cache::{CacheKey, EdgeCache, DEFAULT_EDGE_CACHE_CAPACITY};

/// Default tile freshness: one year.
pub const DEFAULT_TILE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Default descriptor freshness.
pub const DEFAULT_DESCRIPTOR_TTL: Duration = Duration::from_secs(30);

// =============================================================================
// Configuration and Response
// =============================================================================

/// Gateway settings.
#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    /// Format tiles were published in; selects the storage key extension
    pub tile_format: TileFormat,

    pub tile_ttl: Duration,

    pub descriptor_ttl: Duration,

    /// Edge cache capacity in bytes
    pub cache_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            tile_format: TileFormat::default(),
            tile_ttl: DEFAULT_TILE_TTL,
            descriptor_ttl: DEFAULT_DESCRIPTOR_TTL,
            cache_capacity: DEFAULT_EDGE_CACHE_CAPACITY,
        }
    }
}

/// A body ready to be sent to the client.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub body: Bytes,
    pub content_type: String,
    pub cache_control: String,

    /// Whether the body came from the edge cache
    pub cache_hit: bool,

    /// Strong validator, present for tiles
    pub etag: Option<String>,
}

// =============================================================================
// Gateway
// =============================================================================

/// Edge cache gateway over an [`ObjectStore`].
///
/// # Example
///
/// ```ignore
/// use pamphlet_tiles::gateway::{Gateway, GatewayConfig};
/// use pamphlet_tiles::pamphlet::PageRange;
///
/// let gateway = Gateway::new(Arc::new(store), GatewayConfig::default());
///
/// let descriptor = gateway.get_descriptor("annual-report", PageRange::new(0, 10)).await?;
/// let tile = gateway.get_tile("annual-report", &hash).await?;
/// println!("{} bytes, cache hit: {}", tile.body.len(), tile.cache_hit);
/// ```
pub struct Gateway<S: ObjectStore + 'static> {
    store: Arc<S>,
    cache: Arc<EdgeCache>,
    config: GatewayConfig,

    /// Background cache writes not yet reaped
    pending: Mutex<JoinSet<()>>,
}

impl<S: ObjectStore + 'static> Gateway<S> {
    pub fn new(store: Arc<S>, config: GatewayConfig) -> Self {
        Self {
            store,
            cache: Arc::new(EdgeCache::with_capacity(config.cache_capacity)),
            config,
            pending: Mutex::new(JoinSet::new()),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &EdgeCache {
        &self.cache
    }

    /// Get a tile by content hash, using the cache when available.
    pub async fn get_tile(
        &self,
        pamphlet_id: &str,
        hash: &str,
    ) -> Result<GatewayResponse, GatewayError> {
        validate_pamphlet_id(pamphlet_id).map_err(GatewayError::invalid)?;
        if !is_content_hash(hash) {
            return Err(GatewayError::invalid(format!(
                "'{}' is not a content hash",
                hash
            )));
        }

        let content_type = self.config.tile_format.content_type();
        let cache_control = format!(
            "public, max-age={}, immutable",
            self.config.tile_ttl.as_secs()
        );
        let etag = Some(format!("\"{}\"", hash));

        let key = CacheKey::tile(pamphlet_id, hash);
        if let Some(entry) = self.cache.get(&key).await {
            return Ok(GatewayResponse {
                body: entry.body,
                content_type: entry.content_type,
                cache_control,
                cache_hit: true,
                etag,
            });
        }

        let generation = self.cache.generation(pamphlet_id).await;
        let storage_key = tile_key(pamphlet_id, hash, self.config.tile_format);
        let body = self.store.get(&storage_key).await?;
        debug!(key = %storage_key, bytes = body.len(), "Tile fetched from storage");

        self.populate(key, body.clone(), content_type, self.config.tile_ttl, generation);

        Ok(GatewayResponse {
            body,
            content_type: content_type.to_string(),
            cache_control,
            cache_hit: false,
            etag,
        })
    }

    /// Get a window of a pamphlet's descriptor as JSON.
    ///
    /// The cache holds the stored document; the window is cut per request.
    pub async fn get_descriptor(
        &self,
        pamphlet_id: &str,
        range: PageRange,
    ) -> Result<GatewayResponse, GatewayError> {
        validate_pamphlet_id(pamphlet_id).map_err(GatewayError::invalid)?;

        let key = CacheKey::descriptor(pamphlet_id);
        let (raw, fill_generation) = match self.cache.get(&key).await {
            Some(entry) => (entry.body, None),
            None => {
                let generation = self.cache.generation(pamphlet_id).await;
                let raw = self.store.get(&descriptor_key(pamphlet_id)).await?;
                (raw, Some(generation))
            }
        };
        let cache_hit = fill_generation.is_none();

        let descriptor = parse_descriptor(pamphlet_id, &raw)?;
        if let Some(generation) = fill_generation {
            self.populate(
                key,
                raw,
                DESCRIPTOR_CONTENT_TYPE,
                self.config.descriptor_ttl,
                generation,
            );
        }

        let body = serde_json::to_vec(&descriptor.slice(range)).map_err(|e| {
            GatewayError::InvalidDescriptor {
                pamphlet_id: pamphlet_id.to_string(),
                message: e.to_string(),
            }
        })?;

        Ok(GatewayResponse {
            body: Bytes::from(body),
            content_type: DESCRIPTOR_CONTENT_TYPE.to_string(),
            cache_control: format!("public, max-age={}", self.config.descriptor_ttl.as_secs()),
            cache_hit,
            etag: None,
        })
    }

    /// Drop the cached descriptor so the next read goes to storage.
    ///
    /// Tile entries are left to expire; their bytes never change.
    pub async fn invalidate_descriptor(&self, pamphlet_id: &str) -> Result<bool, GatewayError> {
        validate_pamphlet_id(pamphlet_id).map_err(GatewayError::invalid)?;

        let removed = self
            .cache
            .remove(&CacheKey::descriptor(pamphlet_id))
            .await
            .is_some();
        info!(
            pamphlet_id = pamphlet_id,
            removed = removed,
            "Invalidated descriptor"
        );
        Ok(removed)
    }

    /// Delete every stored artifact of a pamphlet and its cache entries.
    ///
    /// Returns the number of deleted storage objects.
    pub async fn delete_pamphlet(&self, pamphlet_id: &str) -> Result<usize, GatewayError> {
        validate_pamphlet_id(pamphlet_id).map_err(GatewayError::invalid)?;

        let deleted = delete_prefix(self.store.as_ref(), &pamphlet_prefix(pamphlet_id))
            .await
            .map_err(GatewayError::StoreUnavailable)?;
        let evicted = self.cache.remove_pamphlet(pamphlet_id).await;

        info!(
            pamphlet_id = pamphlet_id,
            deleted = deleted,
            evicted = evicted,
            "Deleted pamphlet"
        );
        Ok(deleted)
    }

    /// Wait for outstanding background cache writes.
    pub async fn flush(&self) {
        let mut pending = std::mem::take(&mut *self.lock_pending());
        let mut flushed = 0usize;
        while let Some(result) = pending.join_next().await {
            match result {
                Ok(()) => flushed += 1,
                Err(e) => warn!("Cache population failed: {}", e),
            }
        }
        debug!(flushed = flushed, "Flushed cache writes");
    }

    /// Write to the cache without holding up the caller.
    ///
    /// Skipped if the pamphlet's entries were removed after `generation` was read.
    fn populate(
        &self,
        key: CacheKey,
        body: Bytes,
        content_type: &'static str,
        ttl: Duration,
        generation: u64,
    ) {
        let cache = Arc::clone(&self.cache);
        let mut pending = self.lock_pending();

        // Reap writes that already finished so the set stays small
        while let Some(done) = pending.try_join_next() {
            if let Err(e) = done {
                warn!("Cache population failed: {}", e);
            }
        }

        pending.spawn(async move {
            if !cache
                .put_if_current(key, body, content_type, ttl, generation)
                .await
            {
                debug!("Dropped cache write superseded by a removal");
            }
        });
    }

    fn lock_pending(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn parse_descriptor(pamphlet_id: &str, raw: &[u8]) -> Result<PamphletDescriptor, GatewayError> {
    let invalid = |message: String| GatewayError::InvalidDescriptor {
        pamphlet_id: pamphlet_id.to_string(),
        message,
    };
    let descriptor: PamphletDescriptor =
        serde_json::from_slice(raw).map_err(|e| invalid(e.to_string()))?;
    descriptor.validate().map_err(invalid)?;
    Ok(descriptor)
}

// =============================================================================
// Tests
// =============================================================================
