//! Pamphlet publishing.
//!
//! Turns an ordered list of page images into stored tiles plus a descriptor:
//!
//! 1. Pages are partitioned in chunks, each page on the blocking pool
//! 2. Tiles not yet stored in this publish are uploaded with bounded concurrency
//! 3. The descriptor is assembled and written last, so every hash it
//!    references already has a stored object
//!
//! A page that fails to decode or encode does not stop its siblings. Failures
//! are collected per artifact; unless partial publishes are allowed, any
//! failure keeps the previous descriptor in place.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{ArtifactFailure, PublishError, StoreError};
use crate::store::{
    delete_prefix, descriptor_key, pamphlet_prefix, tile_key, validate_pamphlet_id, ObjectStore,
    DESCRIPTOR_CONTENT_TYPE,
};
use crate::tile::{
    PartitionedPage, Tile, TileEncoder, TileFormat, TilePartitioner, DEFAULT_TILE_SIZE,
};

use super::descriptor::{Page, PamphletDescriptor};

/// Default number of concurrent tile uploads.
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 16;

/// Pages partitioned and uploaded together before moving on.
pub const PAGE_CHUNK_SIZE: usize = 8;

// =============================================================================
// Options and Inputs
// =============================================================================

/// How pages are tiled and uploaded.
#[derive(Debug, Clone, Copy)]
pub struct PublishOptions {
    pub tile_size: u32,
    pub encoder: TileEncoder,

    /// Maximum in-flight tile uploads
    pub concurrency: usize,

    /// Publish the pages that succeeded even if some failed
    pub allow_partial: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            encoder: TileEncoder::default(),
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            allow_partial: false,
        }
    }
}

/// One source page image.
#[derive(Debug, Clone)]
pub struct PageSource {
    /// Label used in failure reports (usually the file name)
    pub name: String,

    /// Encoded image bytes (PNG, JPEG or WebP)
    pub bytes: Bytes,
}

impl PageSource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Outcome of a successful publish.
#[derive(Debug, Clone)]
pub struct PublishReport {
    /// Version of the descriptor that was written
    pub version: u64,

    /// Pages in the written descriptor
    pub pages: usize,

    /// Grid cells across all published pages
    pub tiles: usize,

    /// Tile objects written to storage (one per distinct hash)
    pub uploaded: usize,

    /// Artifacts that were skipped (only non-empty with `allow_partial`)
    pub failures: Vec<ArtifactFailure>,
}

/// A partitioned page waiting for its tiles to be stored.
struct PendingPage {
    source_index: usize,
    page: Page,
}

// =============================================================================
// Publisher
// =============================================================================

/// Writes tiles and descriptors for pamphlets.
pub struct Publisher<S: ObjectStore + 'static> {
    store: Arc<S>,
    options: PublishOptions,
}

impl<S: ObjectStore + 'static> Publisher<S> {
    pub fn new(store: Arc<S>, options: PublishOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &PublishOptions {
        &self.options
    }

    fn format(&self) -> TileFormat {
        self.options.encoder.format()
    }

    /// Tile, upload and publish `sources` as the new content of `pamphlet_id`.
    pub async fn publish(
        &self,
        pamphlet_id: &str,
        sources: Vec<PageSource>,
    ) -> Result<PublishReport, PublishError> {
        validate_pamphlet_id(pamphlet_id)
            .map_err(|message| PublishError::InvalidParameter { message })?;
        if sources.is_empty() {
            return Err(PublishError::InvalidParameter {
                message: "at least one page is required".to_string(),
            });
        }
        if self.options.concurrency == 0 {
            return Err(PublishError::InvalidParameter {
                message: "upload concurrency must be positive".to_string(),
            });
        }

        let partitioner = TilePartitioner::new(self.options.tile_size, self.options.encoder)
            .map_err(|e| PublishError::InvalidParameter {
                message: e.to_string(),
            })?;

        info!(
            pamphlet_id = pamphlet_id,
            pages = sources.len(),
            tile_size = self.options.tile_size,
            format = %self.format(),
            "Publishing pamphlet"
        );

        let mut failures = Vec::new();
        let mut stored: HashSet<String> = HashSet::new();
        let mut pending = Vec::with_capacity(sources.len());

        for (chunk_index, chunk) in sources.chunks(PAGE_CHUNK_SIZE).enumerate() {
            let base = chunk_index * PAGE_CHUNK_SIZE;
            let partitioned = partition_chunk(partitioner, base, chunk).await;

            let mut uploads: Vec<Tile> = Vec::new();
            let mut queued: HashSet<String> = HashSet::new();
            for (source_index, name, result) in partitioned {
                match result {
                    Ok(page) => {
                        for tile in &page.tiles {
                            if !stored.contains(&tile.hash) && queued.insert(tile.hash.clone()) {
                                uploads.push(tile.clone());
                            }
                        }
                        pending.push(PendingPage::from_partitioned(source_index, &page));
                    }
                    Err(reason) => {
                        warn!(
                            pamphlet_id = pamphlet_id,
                            page = source_index,
                            source = %name,
                            "Page failed: {}",
                            reason
                        );
                        failures.push(ArtifactFailure {
                            artifact: format!("page {} ({})", source_index, name),
                            reason,
                        });
                    }
                }
            }

            for (hash, result) in self.upload_tiles(pamphlet_id, uploads).await {
                match result {
                    Ok(()) => {
                        stored.insert(hash);
                    }
                    Err(reason) => {
                        let key = tile_key(pamphlet_id, &hash, self.format());
                        warn!(key = %key, "Tile upload failed: {}", reason);
                        failures.push(ArtifactFailure {
                            artifact: key,
                            reason,
                        });
                    }
                }
            }
        }

        if !failures.is_empty() && !self.options.allow_partial {
            return Err(PublishError::Incomplete { failures });
        }

        // Only pages whose every tile is stored survive, renumbered gap-free
        let pages: Vec<Page> = pending
            .into_iter()
            .filter(|p| p.all_tiles_in(&stored))
            .enumerate()
            .map(|(index, p)| p.into_page(index as u32))
            .collect();

        if pages.is_empty() {
            return Err(PublishError::Incomplete { failures });
        }

        let previous = self.load_previous(pamphlet_id).await?;
        let descriptor =
            PamphletDescriptor::assemble(pages, self.options.tile_size, previous.as_ref())
                .map_err(|message| PublishError::Descriptor { message })?;

        let body = serde_json::to_vec(&descriptor).map_err(|e| PublishError::Descriptor {
            message: e.to_string(),
        })?;
        self.store
            .put(
                &descriptor_key(pamphlet_id),
                Bytes::from(body),
                DESCRIPTOR_CONTENT_TYPE,
            )
            .await?;

        let report = PublishReport {
            version: descriptor.version,
            pages: descriptor.pages.len(),
            tiles: descriptor.pages.iter().map(|p| p.tiles.len()).sum(),
            uploaded: stored.len(),
            failures,
        };

        info!(
            pamphlet_id = pamphlet_id,
            version = report.version,
            pages = report.pages,
            tiles = report.tiles,
            uploaded = report.uploaded,
            skipped = report.failures.len(),
            "Published pamphlet"
        );

        Ok(report)
    }

    /// Remove the descriptor and every tile of `pamphlet_id`.
    ///
    /// Listings are key-ordered, so `metadata.json` sorts before `tiles/` and
    /// the descriptor goes first: no reader sees it pointing at deleted tiles.
    pub async fn unpublish(&self, pamphlet_id: &str) -> Result<usize, PublishError> {
        validate_pamphlet_id(pamphlet_id)
            .map_err(|message| PublishError::InvalidParameter { message })?;

        let deleted = delete_prefix(self.store.as_ref(), &pamphlet_prefix(pamphlet_id)).await?;
        info!(pamphlet_id = pamphlet_id, deleted = deleted, "Unpublished pamphlet");
        Ok(deleted)
    }

    /// Upload tiles with at most `concurrency` requests in flight.
    ///
    /// Every tile gets an outcome, including one whose task panicked.
    async fn upload_tiles(
        &self,
        pamphlet_id: &str,
        tiles: Vec<Tile>,
    ) -> Vec<(String, Result<(), String>)> {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let content_type = self.format().content_type();
        let mut futures = FuturesUnordered::new();

        for tile in tiles {
            let store = Arc::clone(&self.store);
            let sem = Arc::clone(&semaphore);
            let key = tile_key(pamphlet_id, &tile.hash, self.format());
            let hash = tile.hash.clone();

            let handle = tokio::spawn(async move {
                match sem.acquire_owned().await {
                    Ok(_permit) => store.put(&key, tile.bytes, content_type).await,
                    Err(_) => Err(StoreError::Connection("upload pool closed".to_string())),
                }
            });
            futures.push(async move {
                let result = match handle.await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(e) => Err(format!("upload task failed: {}", e)),
                };
                (hash, result)
            });
        }

        let mut results = Vec::with_capacity(futures.len());
        while let Some(outcome) = futures.next().await {
            results.push(outcome);
        }
        debug!(pamphlet_id = pamphlet_id, uploads = results.len(), "Uploaded chunk");
        results
    }

    /// The currently published descriptor, if any.
    ///
    /// An unreadable previous descriptor is replaced rather than blocking the publish.
    async fn load_previous(
        &self,
        pamphlet_id: &str,
    ) -> Result<Option<PamphletDescriptor>, PublishError> {
        match self.store.get(&descriptor_key(pamphlet_id)).await {
            Ok(body) => match serde_json::from_slice(&body) {
                Ok(descriptor) => Ok(Some(descriptor)),
                Err(e) => {
                    warn!(
                        pamphlet_id = pamphlet_id,
                        "Ignoring unreadable previous descriptor: {}", e
                    );
                    Ok(None)
                }
            },
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl PendingPage {
    fn from_partitioned(source_index: usize, page: &PartitionedPage) -> Self {
        Self {
            source_index,
            page: page.to_page(source_index as u32),
        }
    }

    fn all_tiles_in(&self, stored: &HashSet<String>) -> bool {
        self.page.tiles.iter().all(|t| stored.contains(&t.hash))
    }

    fn into_page(mut self, index: u32) -> Page {
        if self.source_index != index as usize {
            debug!(source = self.source_index, page = index, "Renumbered page");
        }
        self.page.page = index;
        self.page
    }
}

/// Partition a chunk of pages on the blocking pool, preserving order.
async fn partition_chunk(
    partitioner: TilePartitioner,
    base: usize,
    chunk: &[PageSource],
) -> Vec<(usize, String, Result<PartitionedPage, String>)> {
    let handles: Vec<_> = chunk
        .iter()
        .enumerate()
        .map(|(offset, source)| {
            let bytes = source.bytes.clone();
            let handle =
                tokio::task::spawn_blocking(move || partitioner.partition_bytes(&bytes));
            (base + offset, source.name.clone(), handle)
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (index, name, handle) in handles {
        let result = match handle.await {
            Ok(Ok(page)) => Ok(page),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("partition task failed: {}", e)),
        };
        results.push((index, name, result));
    }
    results
}

// =============================================================================
// Tests
// =============================================================================
