//! Tile production.
//!
//! Runs once per publish: a page image goes in, a grid of content-addressed
//! tiles comes out.
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐
//! │ page image   │───▶│ Partitioner  │───▶│ TileEncoder  │
//! │ (PNG/JPEG/…) │    │ (grid + pad) │    │ (WebP/JPEG)  │
//! └──────────────┘    └──────────────┘    └──────┬───────┘
//!                                                │
//!                                                ▼
//!                                       ┌──────────────────┐
//!                                       │  content_hash    │
//!                                       │  (SHA-256 hex)   │
//!                                       └──────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileGrid`]: grid geometry and per-cell source rectangles
//! - [`TilePartitioner`]: decode, cut, pad, encode and hash a page
//! - [`TileEncoder`] / [`TileFormat`]: codec backends
//! - [`content_hash`]: stable identifier of encoded tile bytes
//!
//! # Example
//!
//! ```no_run
//! use pamphlet_tiles::tile::{TileEncoder, TileFormat, TilePartitioner};
//!
//! let source = std::fs::read("page-001.png").unwrap();
//! let encoder = TileEncoder::new(TileFormat::WebP, 80).unwrap();
//! let partitioner = TilePartitioner::new(512, encoder).unwrap();
//!
//! let page = partitioner.partition_bytes(&source).unwrap();
//! for tile in &page.tiles {
//!     println!("({}, {}) -> {}", tile.x, tile.y, tile.hash);
//! }
//! ```

mod encoder;
mod hash;
mod partition;

pub use encoder::{
    is_valid_quality, TileEncoder, TileFormat, DEFAULT_TILE_QUALITY, MAX_TILE_QUALITY,
    MIN_TILE_QUALITY,
};
pub use hash::{content_hash, is_content_hash, CONTENT_HASH_LEN};
pub use partition::{PartitionedPage, SourceRect, Tile, TileGrid, TilePartitioner};

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;
