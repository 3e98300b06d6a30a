//! # pamphlet-tiles
//!
//! Content-addressed tiles for very large page images, served from S3
//! through a read-through edge cache.
//!
//! A pamphlet is an ordered list of pages. Publishing a pamphlet cuts every
//! page into a fixed grid of tiles, names each tile by the hash of its
//! encoded bytes and writes a descriptor that lists the grid. Identical
//! tiles, within a page or across pages, are stored once.
//!
//! ## Features
//!
//! - **Deterministic tiling**: the same page and settings always give the same hashes
//! - **Deduplicated storage**: one object per distinct tile hash
//! - **Descriptor-last publishing**: readers never see a descriptor with missing tiles
//! - **Edge cache**: LRU with per-entry expiry, long-lived tiles, short-lived descriptors
//! - **Access tokens**: optional HMAC-SHA256 tokens bound to a pamphlet and a time bucket
//!
//! ## Architecture
//!
//! - [`tile`] - Partitioning, encoding and content hashing
//! - [`pamphlet`] - Descriptor model and the publish pipeline
//! - [`store`] - Object storage trait, key layout and the S3 backend
//! - [`gateway`] - Edge cache and the read-through gateway
//! - [`server`] - Axum-based HTTP server, routes and access tokens
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pamphlet_tiles::{create_router, create_s3_client, Gateway, GatewayConfig, RouterConfig, S3ObjectStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = create_s3_client(None, "us-east-1").await;
//!     let store = Arc::new(S3ObjectStore::new(client, "my-pamphlets".to_string()));
//!     let gateway = Arc::new(Gateway::new(store, GatewayConfig::default()));
//!
//!     let router = create_router(gateway, RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod pamphlet;
pub mod server;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use config::{
    Cli, Command, DeleteConfig, PublishConfig, ServeConfig, SignConfig, SignOutputFormat,
    StoreArgs,
};
pub use error::{ArtifactFailure, GatewayError, PublishError, StoreError, TileError};
pub use gateway::{CacheKey, EdgeCache, Gateway, GatewayConfig, GatewayResponse};
pub use pamphlet::{
    DescriptorSlice, Page, PageRange, PageSource, PamphletDescriptor, PublishOptions,
    PublishReport, Publisher, TileRef,
};
pub use server::{
    create_router, AccessTokenService, AppState, AuthError, ErrorResponse, HealthResponse,
    IssuedToken, RouterConfig,
};
pub use store::{create_s3_client, ObjectStore, S3ObjectStore};
pub use tile::{
    content_hash, TileEncoder, TileFormat, TilePartitioner, DEFAULT_TILE_QUALITY,
    DEFAULT_TILE_SIZE,
};
