//! Tile partitioner.
//!
//! Splits a decoded page image into a fixed grid of `T×T` tiles.
//!
//! # Grid
//!
//! ```text
//! tiles_x = ceil(width / T)        tiles_y = ceil(height / T)
//!
//! cell (i, j) covers [i*T, min((i+1)*T, width)) × [j*T, min((j+1)*T, height))
//! ```
//!
//! Every tile is exactly `T×T` before encoding. Cells on the right and bottom
//! edges (or the single cell when `T` exceeds an image dimension) are copied to
//! the top-left of a fully transparent canvas, so a viewer can place tile
//! `(x, y)` at `(x*T, y*T)` without special cases.

use bytes::Bytes;
use image::{imageops, DynamicImage, Rgba, RgbaImage};
use tracing::debug;

use crate::error::TileError;
use crate::pamphlet::{Page, TileRef};

use super::encoder::TileEncoder;
use super::hash::content_hash;

/// Pixel used for the padded area of edge tiles.
const PADDING: Rgba<u8> = Rgba([0, 0, 0, 0]);

// =============================================================================
// Grid Geometry
// =============================================================================

/// Source pixel rectangle of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Tile grid for one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    width: u32,
    height: u32,
    tile_size: u32,
    tiles_x: u32,
    tiles_y: u32,
}

impl TileGrid {
    /// Compute the grid for an image of `width × height` pixels.
    pub fn new(width: u32, height: u32, tile_size: u32) -> Result<Self, TileError> {
        if tile_size == 0 {
            return Err(TileError::InvalidParameter {
                message: "tile size must be positive".to_string(),
            });
        }
        if width == 0 || height == 0 {
            return Err(TileError::InvalidImage { width, height });
        }

        Ok(Self {
            width,
            height,
            tile_size,
            tiles_x: width.div_ceil(tile_size),
            tiles_y: height.div_ceil(tile_size),
        })
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Number of columns.
    pub fn tiles_x(&self) -> u32 {
        self.tiles_x
    }

    /// Number of rows.
    pub fn tiles_y(&self) -> u32 {
        self.tiles_y
    }

    /// Total number of cells.
    pub fn tile_count(&self) -> usize {
        self.tiles_x as usize * self.tiles_y as usize
    }

    /// Iterate cells row by row.
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32)> {
        let tiles_x = self.tiles_x;
        (0..self.tiles_y).flat_map(move |y| (0..tiles_x).map(move |x| (x, y)))
    }

    /// The real-pixel rectangle covered by cell `(i, j)`.
    pub fn source_rect(&self, i: u32, j: u32) -> SourceRect {
        let t = self.tile_size as u64;
        let x0 = i as u64 * t;
        let y0 = j as u64 * t;
        let x1 = ((i as u64 + 1) * t).min(self.width as u64);
        let y1 = ((j as u64 + 1) * t).min(self.height as u64);

        SourceRect {
            x: x0 as u32,
            y: y0 as u32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        }
    }
}

// =============================================================================
// Partition Output
// =============================================================================

/// One encoded, hashed tile.
#[derive(Debug, Clone)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub hash: String,
    pub bytes: Bytes,
}

/// All tiles of one page.
#[derive(Debug, Clone)]
pub struct PartitionedPage {
    pub width: u32,
    pub height: u32,
    pub tile_size: u32,
    pub tiles: Vec<Tile>,
}

impl PartitionedPage {
    /// Descriptor entry for this page at position `index`.
    pub fn to_page(&self, index: u32) -> Page {
        Page {
            page: index,
            width: self.width,
            height: self.height,
            tiles: self
                .tiles
                .iter()
                .map(|t| TileRef {
                    x: t.x,
                    y: t.y,
                    hash: t.hash.clone(),
                })
                .collect(),
        }
    }
}

// =============================================================================
// Partitioner
// =============================================================================

/// Cuts page images into padded, encoded, hashed tiles.
#[derive(Debug, Clone, Copy)]
pub struct TilePartitioner {
    tile_size: u32,
    encoder: TileEncoder,
}

impl TilePartitioner {
    pub fn new(tile_size: u32, encoder: TileEncoder) -> Result<Self, TileError> {
        if tile_size == 0 {
            return Err(TileError::InvalidParameter {
                message: "tile size must be positive".to_string(),
            });
        }
        Ok(Self { tile_size, encoder })
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn encoder(&self) -> &TileEncoder {
        &self.encoder
    }

    /// Decode an encoded source image (PNG, JPEG or WebP) and partition it.
    pub fn partition_bytes(&self, source: &[u8]) -> Result<PartitionedPage, TileError> {
        let image = image::load_from_memory(source).map_err(|e| TileError::DecodeError {
            message: e.to_string(),
        })?;
        self.partition_image(&image)
    }

    /// Partition an already decoded image.
    pub fn partition_image(&self, image: &DynamicImage) -> Result<PartitionedPage, TileError> {
        let grid = TileGrid::new(image.width(), image.height(), self.tile_size)?;
        let rgba = image.to_rgba8();

        let mut tiles = Vec::with_capacity(grid.tile_count());
        for (x, y) in grid.cells() {
            let canvas = cut_tile(&rgba, grid.source_rect(x, y), self.tile_size);
            let bytes = self.encoder.encode(&canvas)?;
            let hash = content_hash(&bytes);
            tiles.push(Tile { x, y, hash, bytes });
        }

        debug!(
            width = image.width(),
            height = image.height(),
            tile_size = self.tile_size,
            tiles = tiles.len(),
            "Partitioned page"
        );

        Ok(PartitionedPage {
            width: image.width(),
            height: image.height(),
            tile_size: self.tile_size,
            tiles,
        })
    }
}

/// Copy `rect` out of `source` onto a `tile_size × tile_size` canvas.
fn cut_tile(source: &RgbaImage, rect: SourceRect, tile_size: u32) -> RgbaImage {
    let region = imageops::crop_imm(source, rect.x, rect.y, rect.width, rect.height).to_image();
    if rect.width == tile_size && rect.height == tile_size {
        return region;
    }

    let mut canvas = RgbaImage::from_pixel(tile_size, tile_size, PADDING);
    imageops::replace(&mut canvas, &region, 0, 0);
    canvas
}

// =============================================================================
// Tests
// =============================================================================
