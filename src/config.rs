//! Configuration management for pamphlet-tiles.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap, one subcommand per tool
//! - Environment variables with `PAMPHLET_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use pamphlet_tiles::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! match cli.into_command() {
//!     Command::Serve(config) => println!("Listening on {}", config.bind_address()),
//!     _ => {}
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `PAMPHLET_HOST` - Server bind address (default: 0.0.0.0)
//! - `PAMPHLET_PORT` - Server port (default: 3000)
//! - `PAMPHLET_S3_BUCKET` - S3 bucket name (required)
//! - `PAMPHLET_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `PAMPHLET_S3_REGION` - AWS region (default: us-east-1)
//! - `PAMPHLET_S3_ROOT` - Key prefix inside the bucket
//! - `PAMPHLET_AUTH_ENABLED` - Require access tokens on reads (default: false)
//! - `PAMPHLET_AUTH_SECRET` - HMAC secret for access tokens
//! - `PAMPHLET_TOKEN_MAX_AGE` - Token lifetime in seconds (default: 3600)
//! - `PAMPHLET_TOKEN_BUCKET_WIDTH` - Token time bucket in seconds (default: 300)
//! - `PAMPHLET_ADMIN_SECRET` - Bearer secret for admin routes
//! - `PAMPHLET_TILE_FORMAT` - Tile format, webp or jpeg (default: webp)
//! - `PAMPHLET_CACHE_SIZE_MB` - Edge cache size in MB (default: 256)
//! - `PAMPHLET_DESCRIPTOR_TTL` - Descriptor cache TTL in seconds (default: 30)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::gateway::{GatewayConfig, DEFAULT_DESCRIPTOR_TTL, DEFAULT_TILE_TTL};
use crate::pamphlet::{PublishOptions, DEFAULT_UPLOAD_CONCURRENCY};
use crate::server::auth::{DEFAULT_BUCKET_WIDTH, DEFAULT_TOKEN_MAX_AGE};
use crate::store::validate_pamphlet_id;
use crate::tile::{
    is_valid_quality, TileEncoder, TileFormat, DEFAULT_TILE_QUALITY, DEFAULT_TILE_SIZE,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default edge cache size in megabytes.
pub const DEFAULT_CACHE_SIZE_MB: usize = 256;

/// Default lifetime of a signed token in seconds.
pub const DEFAULT_SIGN_TTL_SECS: u64 = 3600;

// =============================================================================
// CLI Arguments
// =============================================================================

/// pamphlet-tiles - content-addressed tiles for very large page images.
///
/// Publishes page images as deduplicated tile grids in S3 and serves them
/// through a read-through edge cache.
#[derive(Parser, Debug, Clone)]
#[command(name = "pamphlet-tiles")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the tile gateway.
    Serve(ServeConfig),

    /// Partition page images into tiles and publish a pamphlet.
    Publish(PublishConfig),

    /// Delete every stored artifact of a pamphlet.
    Delete(DeleteConfig),

    /// Issue an access token for a pamphlet.
    Sign(SignConfig),
}

/// Object storage location shared by every command that touches S3.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// S3 bucket holding pamphlet artifacts.
    #[arg(long, env = "PAMPHLET_S3_BUCKET")]
    pub s3_bucket: String,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "PAMPHLET_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "PAMPHLET_S3_REGION")]
    pub s3_region: String,

    /// Key prefix inside the bucket.
    #[arg(long, env = "PAMPHLET_S3_ROOT")]
    pub s3_root: Option<String>,
}

impl StoreArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.s3_bucket.trim().is_empty() {
            return Err(
                "S3 bucket name is required. Set --s3-bucket or PAMPHLET_S3_BUCKET".to_string(),
            );
        }
        if self.s3_region.trim().is_empty() {
            return Err("s3_region must not be empty".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "PAMPHLET_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PAMPHLET_PORT")]
    pub port: u16,

    #[command(flatten)]
    pub store: StoreArgs,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// Require an access token on descriptor and tile reads.
    ///
    /// When disabled, reads are public and tile hashes act as capabilities.
    #[arg(long, default_value_t = false, env = "PAMPHLET_AUTH_ENABLED")]
    pub auth_enabled: bool,

    /// Secret key for HMAC-SHA256 access tokens.
    #[arg(long, env = "PAMPHLET_AUTH_SECRET")]
    pub auth_secret: Option<String>,

    /// Seconds a token stays valid after its time bucket starts.
    #[arg(long, default_value_t = DEFAULT_TOKEN_MAX_AGE.as_secs(), env = "PAMPHLET_TOKEN_MAX_AGE")]
    pub token_max_age: u64,

    /// Width of the token time bucket in seconds.
    #[arg(long, default_value_t = DEFAULT_BUCKET_WIDTH, env = "PAMPHLET_TOKEN_BUCKET_WIDTH")]
    pub token_bucket_width: u64,

    /// Bearer secret for the admin routes. Admin routes are off without it.
    #[arg(long, env = "PAMPHLET_ADMIN_SECRET")]
    pub admin_secret: Option<String>,

    // =========================================================================
    // Gateway Configuration
    // =========================================================================
    /// Format tiles were published in.
    #[arg(long, value_enum, default_value_t = TileFormat::WebP, env = "PAMPHLET_TILE_FORMAT")]
    pub tile_format: TileFormat,

    /// Edge cache size in megabytes.
    #[arg(long, default_value_t = DEFAULT_CACHE_SIZE_MB, env = "PAMPHLET_CACHE_SIZE_MB")]
    pub cache_size_mb: usize,

    /// Seconds a descriptor stays in the edge cache.
    #[arg(long, default_value_t = DEFAULT_DESCRIPTOR_TTL.as_secs(), env = "PAMPHLET_DESCRIPTOR_TTL")]
    pub descriptor_ttl: u64,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "PAMPHLET_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()?;

        if self.auth_enabled && self.auth_secret.as_deref().map_or(true, str::is_empty) {
            return Err(
                "Authentication is enabled but no secret provided. \
                 Set --auth-secret or PAMPHLET_AUTH_SECRET"
                    .to_string(),
            );
        }
        if self.token_max_age == 0 {
            return Err("token_max_age must be greater than 0".to_string());
        }
        if self.token_bucket_width == 0 {
            return Err("token_bucket_width must be greater than 0".to_string());
        }
        if matches!(self.admin_secret.as_deref(), Some("")) {
            return Err("admin_secret must not be empty when set".to_string());
        }
        if self.cache_size_mb == 0 {
            return Err("cache_size_mb must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the auth secret, or "" if unset (call validate() first).
    pub fn auth_secret_or_empty(&self) -> &str {
        self.auth_secret.as_deref().unwrap_or("")
    }

    pub fn token_max_age(&self) -> Duration {
        Duration::from_secs(self.token_max_age)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            tile_format: self.tile_format,
            tile_ttl: DEFAULT_TILE_TTL,
            descriptor_ttl: Duration::from_secs(self.descriptor_ttl),
            cache_capacity: self.cache_size_mb.saturating_mul(1024 * 1024),
        }
    }
}

// =============================================================================
// Publish
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct PublishConfig {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Pamphlet to publish into.
    #[arg(long)]
    pub pamphlet_id: String,

    /// Page images in reading order (PNG, JPEG or WebP).
    #[arg(required = true, num_args = 1..)]
    pub images: Vec<PathBuf>,

    /// Tile edge length in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "PAMPHLET_TILE_SIZE")]
    pub tile_size: u32,

    /// Output tile format.
    #[arg(long, value_enum, default_value_t = TileFormat::WebP, env = "PAMPHLET_TILE_FORMAT")]
    pub format: TileFormat,

    /// Encoder quality (1-100, JPEG only).
    #[arg(long, default_value_t = DEFAULT_TILE_QUALITY)]
    pub quality: u8,

    /// Maximum concurrent tile uploads.
    #[arg(long, default_value_t = DEFAULT_UPLOAD_CONCURRENCY)]
    pub concurrency: usize,

    /// Publish the pages that succeeded even if others failed.
    #[arg(long, default_value_t = false)]
    pub allow_partial: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl PublishConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()?;
        validate_pamphlet_id(&self.pamphlet_id)?;

        if self.images.is_empty() {
            return Err("at least one page image is required".to_string());
        }
        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        if !is_valid_quality(self.quality) {
            return Err("quality must be between 1 and 100".to_string());
        }
        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn publish_options(&self) -> Result<PublishOptions, String> {
        let encoder = TileEncoder::new(self.format, self.quality).map_err(|e| e.to_string())?;
        Ok(PublishOptions {
            tile_size: self.tile_size,
            encoder,
            concurrency: self.concurrency,
            allow_partial: self.allow_partial,
        })
    }
}

// =============================================================================
// Delete
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct DeleteConfig {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Pamphlet whose artifacts are removed.
    #[arg(long)]
    pub pamphlet_id: String,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl DeleteConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.store.validate()?;
        validate_pamphlet_id(&self.pamphlet_id)
    }
}

// =============================================================================
// Sign
// =============================================================================

/// Output format of the `sign` command.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignOutputFormat {
    /// The bare token
    #[default]
    Token,

    /// A ready-to-use `Authorization` header line
    Header,

    /// Token, bucket and expiry as JSON
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct SignConfig {
    /// Secret key shared with the gateway.
    #[arg(long, env = "PAMPHLET_AUTH_SECRET")]
    pub secret: String,

    /// Pamphlet the token grants access to.
    #[arg(long)]
    pub pamphlet_id: String,

    /// Advisory lifetime reported with the token, in seconds.
    #[arg(long, default_value_t = DEFAULT_SIGN_TTL_SECS)]
    pub ttl: u64,

    /// Width of the token time bucket in seconds. Must match the gateway.
    #[arg(long, default_value_t = DEFAULT_BUCKET_WIDTH, env = "PAMPHLET_TOKEN_BUCKET_WIDTH")]
    pub bucket_width: u64,

    #[arg(long, value_enum, default_value_t = SignOutputFormat::Token)]
    pub format: SignOutputFormat,
}

impl SignConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.secret.is_empty() {
            return Err(
                "A secret is required. Set --secret or PAMPHLET_AUTH_SECRET".to_string(),
            );
        }
        validate_pamphlet_id(&self.pamphlet_id)?;
        if self.ttl == 0 {
            return Err("ttl must be greater than 0".to_string());
        }
        if self.bucket_width == 0 {
            return Err("bucket_width must be greater than 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
