//! Router configuration for the pamphlet gateway.
//!
//! This module defines the HTTP routes and applies middleware for token
//! gating, admin authentication and CORS.
//!
//! # Route Structure
//!
//! ```text
//! /health                                        - Health check (public)
//! /pamphlets/{pamphlet_id}/metadata.json         - Descriptor (token-gated if enabled)
//! /pamphlets/{pamphlet_id}/tiles/{hash}.{ext}    - Tile (token-gated if enabled)
//! /admin/pamphlets/{pamphlet_id}/invalidate      - POST, admin secret
//! /admin/pamphlets/{pamphlet_id}                 - DELETE, admin secret
//! ```
//!
//! Admin routes are only mounted when an admin secret is configured.
//!
//! # Example
//!
//! ```ignore
//! use pamphlet_tiles::gateway::{Gateway, GatewayConfig};
//! use pamphlet_tiles::server::auth::{AccessTokenService, DEFAULT_TOKEN_MAX_AGE};
//! use pamphlet_tiles::server::routes::{create_router, RouterConfig};
//!
//! let gateway = Arc::new(Gateway::new(Arc::new(store), GatewayConfig::default()));
//!
//! let config = RouterConfig::new()
//!     .with_token_auth(AccessTokenService::new("my-secret-key"), DEFAULT_TOKEN_MAX_AGE)
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(gateway, config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::auth::{
    admin_middleware, token_middleware, AccessTokenService, AdminSecret, TokenGate,
};
use super::handlers::{
    delete_handler, descriptor_handler, health_handler, invalidate_handler, tile_handler,
    AppState, CACHE_HIT_HEADER,
};
use crate::gateway::Gateway;
use crate::store::ObjectStore;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Clone)]
pub struct RouterConfig {
    /// Token gate for pamphlet reads (None = public, hash-only access)
    pub token_gate: Option<TokenGate>,

    /// Shared secret for admin routes (None = admin routes not mounted)
    pub admin_secret: Option<String>,

    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl RouterConfig {
    /// Public reads, no admin routes, any CORS origin, tracing on.
    pub fn new() -> Self {
        Self {
            token_gate: None,
            admin_secret: None,
            cors_origins: None,
            enable_tracing: true,
        }
    }

    /// Require a valid access token on pamphlet reads.
    pub fn with_token_auth(mut self, tokens: AccessTokenService, max_age: Duration) -> Self {
        self.token_gate = Some(TokenGate::new(tokens, max_age));
        self
    }

    /// Mount admin routes behind `Authorization: Bearer {secret}`.
    pub fn with_admin_secret(mut self, secret: impl Into<String>) -> Self {
        self.admin_secret = Some(secret.into());
        self
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    pub fn auth_enabled(&self) -> bool {
        self.token_gate.is_some()
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the main application router.
///
/// Exactly one read posture is active: token-gated when a token gate is
/// configured, public otherwise.
pub fn create_router<S>(gateway: Arc<Gateway<S>>, config: RouterConfig) -> Router
where
    S: ObjectStore + 'static,
{
    let app_state = AppState::new(gateway);
    let cors = build_cors_layer(&config);

    let mut router = Router::new()
        .merge(build_read_router(app_state.clone(), config.token_gate.clone()))
        .route("/health", get(health_handler));

    if let Some(secret) = &config.admin_secret {
        router = router.merge(build_admin_router(app_state, AdminSecret::new(secret.as_str())));
    }

    let router = router.layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Descriptor and tile routes, gated when `gate` is set.
fn build_read_router<S>(app_state: AppState<S>, gate: Option<TokenGate>) -> Router
where
    S: ObjectStore + 'static,
{
    // {filename} captures both "{hash}" and "{hash}.{ext}"
    let routes = Router::new()
        .route(
            "/pamphlets/{pamphlet_id}/metadata.json",
            get(descriptor_handler::<S>),
        )
        .route(
            "/pamphlets/{pamphlet_id}/tiles/{filename}",
            get(tile_handler::<S>),
        );

    // route_layer so the middleware runs after routing and sees {pamphlet_id}
    let routes = match gate {
        Some(gate) => routes.route_layer(middleware::from_fn_with_state(gate, token_middleware)),
        None => routes,
    };

    routes.with_state(app_state)
}

/// Invalidation and delete routes behind the admin secret.
fn build_admin_router<S>(app_state: AppState<S>, secret: AdminSecret) -> Router
where
    S: ObjectStore + 'static,
{
    Router::new()
        .route(
            "/admin/pamphlets/{pamphlet_id}/invalidate",
            post(invalidate_handler::<S>),
        )
        .route("/admin/pamphlets/{pamphlet_id}", delete(delete_handler::<S>))
        .route_layer(middleware::from_fn_with_state(secret, admin_middleware))
        .with_state(app_state)
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, IF_NONE_MATCH])
        .expose_headers([ETAG, CACHE_HIT_HEADER])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
