//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │   GET /pamphlets/{id}/metadata.json   GET /pamphlets/{id}/tiles │
//! │                                                                 │
//! │  ┌─────────────┐  ┌──────────────┐  ┌─────────────────────────┐ │
//! │  │  handlers   │  │    auth      │  │        routes           │ │
//! │  │ (requests)  │  │ (tokens,     │  │  (router config)        │ │
//! │  │             │  │  admin)      │  │                         │ │
//! │  └─────────────┘  └──────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{
    admin_middleware, token_middleware, AccessTokenService, AdminSecret, AuthError, IssuedToken,
    TokenGate, DEFAULT_BUCKET_WIDTH, DEFAULT_TOKEN_MAX_AGE,
};
pub use handlers::{
    delete_handler, descriptor_handler, health_handler, invalidate_handler, tile_handler,
    AppState, DeleteResponse, ErrorResponse, HealthResponse, TilePathParams, CACHE_HIT_HEADER,
};
pub use routes::{create_router, RouterConfig};
