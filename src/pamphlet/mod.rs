//! Pamphlets: descriptors and the publish pipeline.
//!
//! ```text
//! page images ──▶ Publisher ──▶ tiles/{hash}.{ext}   (one object per distinct hash)
//!                     │
//!                     └───────▶ metadata.json        (written last)
//! ```
//!
//! - [`PamphletDescriptor`]: versioned page/tile listing and its read window
//! - [`Publisher`]: tiles pages, uploads artifacts, then swaps the descriptor

mod descriptor;
mod publish;

pub use descriptor::{DescriptorSlice, Page, PageRange, PamphletDescriptor, TileRef, MAX_PAGE_LIMIT};
pub use publish::{
    PageSource, PublishOptions, PublishReport, Publisher, DEFAULT_UPLOAD_CONCURRENCY,
    PAGE_CHUNK_SIZE,
};
