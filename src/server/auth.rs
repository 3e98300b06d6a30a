//! Time-bucketed access tokens for pamphlet reads.
//!
//! Tokens are cache friendly: every client asking for the same pamphlet
//! within one bucket gets the same token, so token-bearing URLs still share
//! edge cache entries.
//!
//! # Token Scheme
//!
//! ```text
//! bucket    = floor(now / bucket_width) * bucket_width
//! signature = HMAC-SHA256(secret, "{pamphlet_id}:{bucket}")
//! token     = "{bucket}.{hex(signature)}"
//! ```
//!
//! The token is sent as `Authorization: Bearer {token}` or `?token={token}`.
//! A token is accepted while `now - bucket <= max_age`.
//!
//! # Security Properties
//!
//! - **Resource binding**: the pamphlet id is part of the signed message
//! - **Time-limited**: validation rejects buckets older than `max_age`
//! - **Constant-time comparison**: signatures are compared with `subtle`
//!
//! # Example
//!
//! ```rust
//! use pamphlet_tiles::server::auth::AccessTokenService;
//! use std::time::Duration;
//!
//! let tokens = AccessTokenService::new("my-secret-key");
//!
//! let issued = tokens.issue("annual-report", Duration::from_secs(3600));
//! assert!(tokens
//!     .validate("annual-report", &issued.token, Duration::from_secs(3600))
//!     .is_ok());
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use url::form_urlencoded;

use super::handlers::ErrorResponse;

/// Default bucket width in seconds.
pub const DEFAULT_BUCKET_WIDTH: u64 = 300;

/// Default maximum token age.
pub const DEFAULT_TOKEN_MAX_AGE: Duration = Duration::from_secs(3600);

/// Query parameter carrying a token.
pub const TOKEN_QUERY_PARAM: &str = "token";

// =============================================================================
// Types
// =============================================================================

/// HMAC-SHA256 type alias
type HmacSha256 = Hmac<Sha256>;

/// Authentication error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No token in the header or query string
    MissingToken,

    /// Token is not `{bucket}.{hex}`
    MalformedToken,

    /// Signature mismatch, unaligned bucket or bucket in the future
    InvalidToken,

    /// Bucket is older than the accepted age
    Expired {
        bucket: u64,
        current_time: u64,
        max_age: u64,
    },
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MissingToken => write!(f, "Missing access token"),
            AuthError::MalformedToken => write!(f, "Malformed access token"),
            AuthError::InvalidToken => write!(f, "Invalid access token"),
            AuthError::Expired {
                bucket,
                current_time,
                max_age,
            } => write!(
                f,
                "Access token from {} expired (current time: {}, max age: {}s)",
                bucket, current_time, max_age
            ),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = StatusCode::UNAUTHORIZED;
        let error_type = match &self {
            AuthError::MissingToken => "missing_token",
            AuthError::MalformedToken => "malformed_token",
            AuthError::InvalidToken => "invalid_token",
            AuthError::Expired { .. } => "token_expired",
        };
        let message = self.to_string();

        // Bad signatures may be probing; expiry and absence are routine
        match &self {
            AuthError::InvalidToken => {
                warn!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    message
                );
            }
            _ => {
                debug!(
                    error_type = error_type,
                    status = status.as_u16(),
                    "Authentication failed: {}",
                    message
                );
            }
        }

        (status, Json(ErrorResponse::new(error_type, message))).into_response()
    }
}

/// A freshly issued token.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,

    /// Start of the time bucket (Unix seconds)
    pub bucket: u64,

    /// Advisory expiry for the client: `bucket + ttl`
    pub expires_at: u64,
}

// =============================================================================
// Access Token Service
// =============================================================================

/// Issues and validates time-bucketed HMAC tokens.
#[derive(Clone)]
pub struct AccessTokenService {
    secret: Vec<u8>,
    bucket_width: u64,
}

impl AccessTokenService {
    /// Create a service with the default 300 second bucket.
    ///
    /// The secret should be at least 32 bytes.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            bucket_width: DEFAULT_BUCKET_WIDTH,
        }
    }

    /// Use a different bucket width in seconds (minimum 1).
    pub fn with_bucket_width(mut self, seconds: u64) -> Self {
        self.bucket_width = seconds.max(1);
        self
    }

    pub fn bucket_width(&self) -> u64 {
        self.bucket_width
    }

    /// Round a Unix timestamp down to its bucket.
    pub fn bucket_for(&self, unix_seconds: u64) -> u64 {
        unix_seconds - unix_seconds % self.bucket_width
    }

    /// Issue a token for `resource_id` in the current bucket.
    pub fn issue(&self, resource_id: &str, ttl: Duration) -> IssuedToken {
        self.issue_at(resource_id, ttl, now_unix())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(&self, resource_id: &str, ttl: Duration, now: u64) -> IssuedToken {
        let bucket = self.bucket_for(now);
        let signature = hex::encode(self.compute_signature(resource_id, bucket));
        IssuedToken {
            token: format!("{}.{}", bucket, signature),
            bucket,
            expires_at: bucket.saturating_add(ttl.as_secs()),
        }
    }

    /// Validate a token for `resource_id` against the current time.
    pub fn validate(
        &self,
        resource_id: &str,
        token: &str,
        max_age: Duration,
    ) -> Result<(), AuthError> {
        self.validate_at(resource_id, token, max_age, now_unix())
    }

    /// Validate a token as if the current time were `now`.
    pub fn validate_at(
        &self,
        resource_id: &str,
        token: &str,
        max_age: Duration,
        now: u64,
    ) -> Result<(), AuthError> {
        let (bucket, signature) = token.split_once('.').ok_or(AuthError::MalformedToken)?;
        if bucket.is_empty() || !bucket.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AuthError::MalformedToken);
        }
        let bucket: u64 = bucket.parse().map_err(|_| AuthError::MalformedToken)?;
        let provided = hex::decode(signature).map_err(|_| AuthError::MalformedToken)?;

        if bucket % self.bucket_width != 0 || bucket > now.saturating_add(self.bucket_width) {
            return Err(AuthError::InvalidToken);
        }

        let expected = self.compute_signature(resource_id, bucket);
        if !bool::from(provided.ct_eq(&expected)) {
            return Err(AuthError::InvalidToken);
        }

        let max_age = max_age.as_secs();
        if now.saturating_sub(bucket) > max_age {
            return Err(AuthError::Expired {
                bucket,
                current_time: now,
                max_age,
            });
        }

        Ok(())
    }

    fn compute_signature(&self, resource_id: &str, bucket: u64) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(format!("{}:{}", resource_id, bucket).as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// =============================================================================
// Token Extraction
// =============================================================================

/// Read a bearer token from the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Find the request token, preferring the header over `?token=`.
fn request_token(request: &Request) -> Result<String, AuthError> {
    if let Some(token) = bearer_token(request.headers()) {
        return Ok(token.to_string());
    }

    let query = request.uri().query().unwrap_or("");
    let mut token = None;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        if key == TOKEN_QUERY_PARAM {
            if token.is_some() {
                return Err(AuthError::MalformedToken);
            }
            token = Some(value.into_owned());
        }
    }
    token.ok_or(AuthError::MissingToken)
}

// =============================================================================
// Axum Middleware
// =============================================================================

/// State for [`token_middleware`].
#[derive(Clone)]
pub struct TokenGate {
    pub tokens: AccessTokenService,
    pub max_age: Duration,
}

impl TokenGate {
    pub fn new(tokens: AccessTokenService, max_age: Duration) -> Self {
        Self { tokens, max_age }
    }
}

/// Reject pamphlet reads without a valid token.
///
/// Must be applied with `route_layer` so the `pamphlet_id` path parameter
/// is available; the pamphlet id is the signed resource.
///
/// # Example
///
/// ```ignore
/// use axum::{middleware, routing::get, Router};
///
/// let gate = TokenGate::new(AccessTokenService::new("secret"), DEFAULT_TOKEN_MAX_AGE);
/// let app = Router::new()
///     .route("/pamphlets/{pamphlet_id}/metadata.json", get(descriptor_handler))
///     .route_layer(middleware::from_fn_with_state(gate, token_middleware));
/// ```
pub async fn token_middleware(
    State(gate): State<TokenGate>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let pamphlet_id = params
        .get("pamphlet_id")
        .ok_or(AuthError::InvalidToken)?;
    let token = request_token(&request)?;

    gate.tokens.validate(pamphlet_id, &token, gate.max_age)?;

    Ok(next.run(request).await)
}

/// Shared secret guarding admin routes.
#[derive(Clone)]
pub struct AdminSecret(Arc<str>);

impl AdminSecret {
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self(secret.into())
    }

    fn matches(&self, candidate: &str) -> bool {
        self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

/// Require `Authorization: Bearer {admin secret}`.
pub async fn admin_middleware(
    State(secret): State<AdminSecret>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let provided = bearer_token(request.headers()).ok_or(AuthError::MissingToken)?;
    if !secret.matches(provided) {
        return Err(AuthError::InvalidToken);
    }
    Ok(next.run(request).await)
}

// =============================================================================
// Tests
// =============================================================================
