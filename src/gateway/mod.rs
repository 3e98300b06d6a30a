//! Edge cache gateway.
//!
//! Serves tiles and descriptors from an in-process edge cache, falling back
//! to the object store on a miss.
//!
//! - [`EdgeCache`]: LRU cache with per-entry expiry
//! - [`Gateway`]: validation, read-through lookups, invalidation

mod cache;
mod service;

pub use cache::{CacheEntry, CacheKey, EdgeCache, DEFAULT_EDGE_CACHE_CAPACITY, DEFAULT_MAX_ENTRIES};
pub use service::{
    Gateway, GatewayConfig, GatewayResponse, DEFAULT_DESCRIPTOR_TTL, DEFAULT_TILE_TTL,
};
