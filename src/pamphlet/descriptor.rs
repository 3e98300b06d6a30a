//! Pamphlet descriptor.
//!
//! The descriptor is the single mutable document of a pamphlet. It lists
//! every page, its pixel size and the content hash of each grid cell:
//!
//! ```json
//! {
//!   "version": 1735689600000,
//!   "tile_size": 512,
//!   "pages": [
//!     {
//!       "page": 0,
//!       "width": 2480,
//!       "height": 3508,
//!       "tiles": [{ "x": 0, "y": 0, "hash": "3f1c…" }]
//!     }
//!   ]
//! }
//! ```
//!
//! A republish replaces the whole document. There is no per-page merge, so
//! pages missing from the new upload are gone.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::tile::is_content_hash;

/// Maximum pages returned by one descriptor read.
pub const MAX_PAGE_LIMIT: usize = 100;

// =============================================================================
// Types
// =============================================================================

/// Reference from a grid cell to its stored tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRef {
    pub x: u32,
    pub y: u32,
    pub hash: String,
}

/// One page of a pamphlet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 0-based position in the pamphlet
    pub page: u32,
    pub width: u32,
    pub height: u32,
    pub tiles: Vec<TileRef>,
}

/// The versioned description of every page and tile of a pamphlet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PamphletDescriptor {
    /// Milliseconds since the Unix epoch when assembled; only ever increases
    pub version: u64,

    /// Edge length of every tile in pixels
    pub tile_size: u32,

    pub pages: Vec<Page>,
}

/// Requested window of pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PageRange {
    /// First page to return (default 0)
    #[serde(default)]
    pub start: Option<usize>,

    /// Number of pages to return (default: all remaining, max 100)
    #[serde(default)]
    pub limit: Option<usize>,
}

impl PageRange {
    pub fn new(start: usize, limit: usize) -> Self {
        Self {
            start: Some(start),
            limit: Some(limit),
        }
    }

    /// The whole descriptor.
    pub fn all() -> Self {
        Self::default()
    }
}

/// A window of a descriptor as returned by the read API.
#[derive(Debug, Clone, Serialize)]
pub struct DescriptorSlice<'a> {
    pub version: u64,
    pub tile_size: u32,
    pub pages: &'a [Page],
    pub total_pages: usize,
    pub has_more: bool,
    pub has_previous: bool,
}

// =============================================================================
// Assembly and Validation
// =============================================================================

impl PamphletDescriptor {
    /// Assemble a descriptor from processed pages.
    ///
    /// The version is the current time in milliseconds, bumped past
    /// `previous.version` when the clock has not moved forward.
    pub fn assemble(
        pages: Vec<Page>,
        tile_size: u32,
        previous: Option<&PamphletDescriptor>,
    ) -> Result<Self, String> {
        let descriptor = Self {
            version: next_version(now_millis(), previous.map(|p| p.version)),
            tile_size,
            pages,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Check the grid invariants of every page.
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_size == 0 {
            return Err("tile_size must be positive".to_string());
        }

        for (index, page) in self.pages.iter().enumerate() {
            if page.page as usize != index {
                return Err(format!(
                    "page at position {} has index {}",
                    index, page.page
                ));
            }
            if page.width == 0 || page.height == 0 {
                return Err(format!(
                    "page {} has empty dimensions {}x{}",
                    index, page.width, page.height
                ));
            }

            let tiles_x = page.width.div_ceil(self.tile_size);
            let tiles_y = page.height.div_ceil(self.tile_size);
            let expected = tiles_x as usize * tiles_y as usize;
            if page.tiles.len() != expected {
                return Err(format!(
                    "page {} has {} tiles, expected {}",
                    index,
                    page.tiles.len(),
                    expected
                ));
            }

            let mut seen = HashSet::with_capacity(expected);
            for tile in &page.tiles {
                if tile.x >= tiles_x || tile.y >= tiles_y {
                    return Err(format!(
                        "page {} tile ({}, {}) is outside the {}x{} grid",
                        index, tile.x, tile.y, tiles_x, tiles_y
                    ));
                }
                if !seen.insert((tile.x, tile.y)) {
                    return Err(format!(
                        "page {} has duplicate tile ({}, {})",
                        index, tile.x, tile.y
                    ));
                }
                if !is_content_hash(&tile.hash) {
                    return Err(format!(
                        "page {} tile ({}, {}) has malformed hash '{}'",
                        index, tile.x, tile.y, tile.hash
                    ));
                }
            }
        }

        Ok(())
    }

    /// Every distinct tile hash referenced by the descriptor.
    pub fn tile_hashes(&self) -> HashSet<&str> {
        self.pages
            .iter()
            .flat_map(|p| p.tiles.iter().map(|t| t.hash.as_str()))
            .collect()
    }

    /// Select a window of pages for the read API.
    pub fn slice(&self, range: PageRange) -> DescriptorSlice<'_> {
        let total = self.pages.len();
        let start = range.start.unwrap_or(0).min(total);
        let end = match range.limit {
            Some(limit) => start.saturating_add(limit.clamp(1, MAX_PAGE_LIMIT)).min(total),
            None => total,
        };

        DescriptorSlice {
            version: self.version,
            tile_size: self.tile_size,
            pages: &self.pages[start..end],
            total_pages: total,
            has_more: end < total,
            has_previous: start > 0,
        }
    }
}

fn next_version(now: u64, previous: Option<u64>) -> u64 {
    match previous {
        Some(prev) if now <= prev => prev + 1,
        _ => now,
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// Tests
// =============================================================================
