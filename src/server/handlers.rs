//! HTTP request handlers for the pamphlet read API.
//!
//! # Endpoints
//!
//! - `GET /pamphlets/{pamphlet_id}/metadata.json` - Descriptor window
//! - `GET /pamphlets/{pamphlet_id}/tiles/{hash}.{ext}` - Serve a tile
//! - `POST /admin/pamphlets/{pamphlet_id}/invalidate` - Drop the cached descriptor
//! - `DELETE /admin/pamphlets/{pamphlet_id}` - Delete a pamphlet
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{GatewayError, StoreError};
use crate::gateway::{Gateway, GatewayResponse};
use crate::pamphlet::PageRange;
use crate::store::ObjectStore;

/// Response header reporting whether the edge cache served the body.
pub const CACHE_HIT_HEADER: HeaderName = HeaderName::from_static("x-cache-hit");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the gateway.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S: ObjectStore + 'static> {
    pub gateway: Arc<Gateway<S>>,
}

impl<S: ObjectStore + 'static> AppState<S> {
    pub fn new(gateway: Arc<Gateway<S>>) -> Self {
        Self { gateway }
    }
}

impl<S: ObjectStore + 'static> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from: `/pamphlets/{pamphlet_id}/tiles/{filename}`
/// where filename is `{hash}` or `{hash}.{ext}`
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub pamphlet_id: String,

    /// Content hash with optional extension (e.g., "3f1c…" or "3f1c….webp")
    pub filename: String,
}

impl TilePathParams {
    /// The hash part of the filename, accepting only the served extension.
    pub fn hash(&self, extension: &str) -> Result<&str, GatewayError> {
        match self.filename.split_once('.') {
            None => Ok(&self.filename),
            Some((hash, ext)) if ext == extension => Ok(hash),
            Some((_, ext)) => Err(GatewayError::invalid(format!(
                "unsupported tile extension '.{}' (tiles are served as .{})",
                ext, extension
            ))),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_parameter")
    pub error: String,

    /// Human-readable error message
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response from the delete endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// Number of storage objects removed
    pub deleted: usize,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert GatewayError to HTTP response.
///
/// - 404 is logged at DEBUG (routine for stale links)
/// - other 4xx errors are logged at WARN level (client errors)
/// - 5xx errors are logged at ERROR level (server errors)
///
/// Storage details stay in the logs; clients get a generic message.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            GatewayError::InvalidParameter { message } => (
                StatusCode::BAD_REQUEST,
                "invalid_parameter",
                message.clone(),
            ),
            GatewayError::NotFound { .. } => (
                StatusCode::NOT_FOUND,
                "not_found",
                "Resource not found".to_string(),
            ),
            GatewayError::StoreUnavailable(StoreError::Connection(_)) => (
                StatusCode::BAD_GATEWAY,
                "store_unavailable",
                "Storage could not be reached".to_string(),
            ),
            GatewayError::StoreUnavailable(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                "Storage error".to_string(),
            ),
            GatewayError::InvalidDescriptor { pamphlet_id, .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "invalid_descriptor",
                format!("Descriptor for '{}' is unreadable", pamphlet_id),
            ),
        };

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Request failed: {}",
                self
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Request failed: {}",
                self
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Request failed: {}",
                self
            );
        }

        let body = ErrorResponse::new(error_type, message);
        (status, Json(body)).into_response()
    }
}

// Malformed path segments or query strings get the same JSON body as every
// other bad parameter
impl From<PathRejection> for GatewayError {
    fn from(rejection: PathRejection) -> Self {
        GatewayError::invalid(rejection.body_text())
    }
}

impl From<QueryRejection> for GatewayError {
    fn from(rejection: QueryRejection) -> Self {
        GatewayError::invalid(rejection.body_text())
    }
}

/// Whether an `If-None-Match` header lists `etag` (or `*`).
fn etag_matches(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|candidate| candidate.trim())
        .any(|candidate| {
            candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
        })
}

fn gateway_response(response: GatewayResponse) -> Response {
    let mut headers = vec![
        (header::CONTENT_TYPE, response.content_type),
        (header::CACHE_CONTROL, response.cache_control),
        (CACHE_HIT_HEADER, response.cache_hit.to_string()),
    ];
    if let Some(etag) = response.etag {
        headers.push((header::ETAG, etag));
    }

    let mut http_response = response.body.into_response();
    for (name, value) in headers {
        match value.parse::<HeaderValue>() {
            Ok(value) => {
                http_response.headers_mut().insert(name, value);
            }
            Err(e) => warn!(header = %name, "Dropping unrepresentable header: {}", e),
        }
    }
    http_response
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle descriptor requests.
///
/// # Endpoint
///
/// `GET /pamphlets/{pamphlet_id}/metadata.json`
///
/// # Query Parameters
///
/// - `start`: first page (default: 0)
/// - `limit`: page count (default: all, clamped to 1-100)
/// - `token`: access token (when token gating is enabled)
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "version": 1735689600000,
///   "tile_size": 512,
///   "pages": [{ "page": 0, "width": 2480, "height": 3508, "tiles": [] }],
///   "total_pages": 12,
///   "has_more": true,
///   "has_previous": false
/// }
/// ```
///
/// # Headers
///
/// - `Cache-Control: public, max-age={descriptor_ttl}`
/// - `X-Cache-Hit: true|false`
pub async fn descriptor_handler<S: ObjectStore + 'static>(
    State(state): State<AppState<S>>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<PageRange>, QueryRejection>,
) -> Result<Response, GatewayError> {
    let Path(pamphlet_id) = path?;
    let Query(range) = query?;
    let response = state.gateway.get_descriptor(&pamphlet_id, range).await?;
    Ok(gateway_response(response))
}

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /pamphlets/{pamphlet_id}/tiles/{hash}.{ext}`
///
/// # Response
///
/// - `200 OK`: tile bytes with `Content-Type: image/webp` (or `image/jpeg`)
/// - `304 Not Modified`: `If-None-Match` carries the tile's ETag
/// - `400 Bad Request`: malformed pamphlet id or hash
/// - `404 Not Found`: tile not in storage
///
/// # Headers
///
/// - `Cache-Control: public, max-age={tile_ttl}, immutable`
/// - `ETag: "{hash}"`
/// - `X-Cache-Hit: true|false`
pub async fn tile_handler<S: ObjectStore + 'static>(
    State(state): State<AppState<S>>,
    path: Result<Path<TilePathParams>, PathRejection>,
    headers: HeaderMap,
) -> Result<Response, GatewayError> {
    let Path(params) = path?;
    let extension = state.gateway.config().tile_format.extension();
    let hash = params.hash(extension)?;

    let response = state.gateway.get_tile(&params.pamphlet_id, hash).await?;

    if let Some(etag) = response.etag.as_deref() {
        if etag_matches(&headers, etag) {
            let mut not_modified = StatusCode::NOT_MODIFIED.into_response();
            let out = not_modified.headers_mut();
            if let Ok(value) = etag.parse::<HeaderValue>() {
                out.insert(header::ETAG, value);
            }
            if let Ok(value) = response.cache_control.parse::<HeaderValue>() {
                out.insert(header::CACHE_CONTROL, value);
            }
            return Ok(not_modified);
        }
    }

    Ok(gateway_response(response))
}

/// Handle descriptor invalidation.
///
/// `POST /admin/pamphlets/{pamphlet_id}/invalidate` → `204 No Content`
pub async fn invalidate_handler<S: ObjectStore + 'static>(
    State(state): State<AppState<S>>,
    path: Result<Path<String>, PathRejection>,
) -> Result<StatusCode, GatewayError> {
    let Path(pamphlet_id) = path?;
    state.gateway.invalidate_descriptor(&pamphlet_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handle pamphlet deletion.
///
/// `DELETE /admin/pamphlets/{pamphlet_id}` → `{"deleted": n}`
pub async fn delete_handler<S: ObjectStore + 'static>(
    State(state): State<AppState<S>>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<DeleteResponse>, GatewayError> {
    let Path(pamphlet_id) = path?;
    let deleted = state.gateway.delete_pamphlet(&pamphlet_id).await?;
    Ok(Json(DeleteResponse { deleted }))
}

/// Handle health check requests.
///
/// `GET /health` → `{"status": "healthy", "version": "0.1.0"}`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
