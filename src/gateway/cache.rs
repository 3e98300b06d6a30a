//! Edge cache for tiles and descriptors.
//!
//! An LRU cache bounded by total body size and entry count, where every entry
//! carries its own expiry. Tiles are stored with a long TTL since their bytes
//! never change for a given hash; descriptors get a short one.
//!
//! # Cache Key
//!
//! - `Tile { pamphlet_id, hash }`: the request's canonical identity
//! - `Descriptor { pamphlet_id }`: one entry per pamphlet
//!
//! Expiry uses [`tokio::time::Instant`], so freshness can be driven by a
//! paused clock in tests.
//!
//! # Generations
//!
//! Every pamphlet has a generation counter that removals bump. A fill that
//! read the store before a removal carries the old generation and is
//! dropped by [`EdgeCache::put_if_current`], so invalidated bytes never
//! come back.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Default cache capacity: 256MB
pub const DEFAULT_EDGE_CACHE_CAPACITY: usize = 256 * 1024 * 1024;

/// Default maximum number of entries (to bound LRU overhead)
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

// =============================================================================
// Cache Key
// =============================================================================

/// Identity of a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Tile { pamphlet_id: Arc<str>, hash: Arc<str> },
    Descriptor { pamphlet_id: Arc<str> },
}

impl CacheKey {
    pub fn tile(pamphlet_id: impl Into<Arc<str>>, hash: impl Into<Arc<str>>) -> Self {
        CacheKey::Tile {
            pamphlet_id: pamphlet_id.into(),
            hash: hash.into(),
        }
    }

    pub fn descriptor(pamphlet_id: impl Into<Arc<str>>) -> Self {
        CacheKey::Descriptor {
            pamphlet_id: pamphlet_id.into(),
        }
    }

    pub fn pamphlet_id(&self) -> &str {
        match self {
            CacheKey::Tile { pamphlet_id, .. } | CacheKey::Descriptor { pamphlet_id } => {
                pamphlet_id
            }
        }
    }
}

/// A cached response body.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub body: Bytes,
    pub content_type: String,
    pub expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

// =============================================================================
// Edge Cache
// =============================================================================

/// Size-bounded LRU cache with per-entry expiry.
///
/// Thread-safe; share it across tasks via `Arc`.
///
/// # Example
///
/// ```
/// use pamphlet_tiles::gateway::{CacheKey, EdgeCache};
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let cache = EdgeCache::new();
///     let key = CacheKey::tile("annual-report", "ab".repeat(32));
///
///     cache
///         .put(key.clone(), Bytes::from_static(b"RIFF"), "image/webp", Duration::from_secs(60))
///         .await;
///
///     let entry = cache.get(&key).await.unwrap();
///     assert_eq!(entry.content_type, "image/webp");
/// }
/// ```
pub struct EdgeCache {
    cache: RwLock<LruCache<CacheKey, CacheEntry>>,

    /// Maximum total body size in bytes
    max_size: usize,

    /// Current total body size in bytes
    current_size: RwLock<usize>,

    /// Removal count per pamphlet, absent means zero
    generations: RwLock<HashMap<String, u64>>,
}

impl EdgeCache {
    /// Create a cache with default capacity (256MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EDGE_CACHE_CAPACITY)
    }

    /// Create a cache holding at most `max_size` bytes of bodies.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    /// Create a cache with explicit byte capacity and entry bound.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: RwLock::new(LruCache::new(entries)),
            max_size,
            current_size: RwLock::new(0),
            generations: RwLock::new(HashMap::new()),
        }
    }

    /// Current generation of a pamphlet's entries.
    ///
    /// Read it before fetching from the store and hand it to
    /// [`put_if_current`](Self::put_if_current).
    pub async fn generation(&self, pamphlet_id: &str) -> u64 {
        self.generations
            .read()
            .await
            .get(pamphlet_id)
            .copied()
            .unwrap_or(0)
    }

    async fn bump_generation(&self, pamphlet_id: &str) {
        let mut generations = self.generations.write().await;
        *generations.entry(pamphlet_id.to_string()).or_insert(0) += 1;
    }

    /// Get a fresh entry, marking it recently used.
    ///
    /// An expired entry is evicted and reported as a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut cache = self.cache.write().await;

        let expired = match cache.get(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => return Some(entry.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            if let Some(stale) = cache.pop(key) {
                let mut current_size = self.current_size.write().await;
                *current_size = current_size.saturating_sub(stale.body.len());
            }
        }
        None
    }

    /// Whether a fresh entry exists, without touching LRU order.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        let cache = self.cache.read().await;
        cache
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    /// Store a body that stays fresh for `ttl`.
    ///
    /// Least-recently-used entries are evicted until the cache is back
    /// within its byte capacity.
    pub async fn put(&self, key: CacheKey, body: Bytes, content_type: &str, ttl: Duration) {
        let data_size = body.len();
        let entry = CacheEntry {
            body,
            content_type: content_type.to_string(),
            expires_at: Instant::now() + ttl,
        };

        let mut cache = self.cache.write().await;
        self.insert_locked(&mut cache, key, entry, data_size).await;
    }

    /// Store a body only if no removal touched its pamphlet since
    /// `generation` was read. Returns whether the entry was stored.
    pub async fn put_if_current(
        &self,
        key: CacheKey,
        body: Bytes,
        content_type: &str,
        ttl: Duration,
        generation: u64,
    ) -> bool {
        let data_size = body.len();
        let entry = CacheEntry {
            body,
            content_type: content_type.to_string(),
            expires_at: Instant::now() + ttl,
        };

        // Removals bump while holding the cache lock, so this check cannot interleave
        let mut cache = self.cache.write().await;
        if self.generation(key.pamphlet_id()).await != generation {
            return false;
        }
        self.insert_locked(&mut cache, key, entry, data_size).await;
        true
    }

    async fn insert_locked(
        &self,
        cache: &mut LruCache<CacheKey, CacheEntry>,
        key: CacheKey,
        entry: CacheEntry,
        data_size: usize,
    ) {
        let mut current_size = self.current_size.write().await;

        // Either the replaced value for this key or an entry pushed out by the count bound
        if let Some((_, displaced)) = cache.push(key, entry) {
            *current_size = current_size.saturating_sub(displaced.body.len());
        }
        *current_size += data_size;

        while *current_size > self.max_size {
            match cache.pop_lru() {
                Some((_, evicted)) => {
                    *current_size = current_size.saturating_sub(evicted.body.len());
                }
                None => break,
            }
        }
    }

    /// Remove an entry, returning it if it existed.
    ///
    /// Bumps the pamphlet's generation, so fills started earlier are dropped.
    pub async fn remove(&self, key: &CacheKey) -> Option<CacheEntry> {
        let mut cache = self.cache.write().await;
        self.bump_generation(key.pamphlet_id()).await;
        let mut current_size = self.current_size.write().await;

        let entry = cache.pop(key)?;
        *current_size = current_size.saturating_sub(entry.body.len());
        Some(entry)
    }

    /// Drop every entry of one pamphlet and bump its generation. Walks the
    /// whole cache.
    pub async fn remove_pamphlet(&self, pamphlet_id: &str) -> usize {
        let mut cache = self.cache.write().await;
        self.bump_generation(pamphlet_id).await;
        let mut current_size = self.current_size.write().await;

        let keys: Vec<CacheKey> = cache
            .iter()
            .filter(|(key, _)| key.pamphlet_id() == pamphlet_id)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            if let Some(entry) = cache.pop(key) {
                *current_size = current_size.saturating_sub(entry.body.len());
            }
        }
        keys.len()
    }

    pub async fn clear(&self) {
        let mut cache = self.cache.write().await;
        let mut current_size = self.current_size.write().await;
        cache.clear();
        *current_size = 0;
    }

    /// Number of entries, including expired ones not yet evicted.
    pub async fn len(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.cache.read().await.is_empty()
    }

    /// Total cached body size in bytes.
    pub async fn size(&self) -> usize {
        *self.current_size.read().await
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for EdgeCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
