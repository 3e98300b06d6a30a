use thiserror::Error;

/// Errors that can occur when talking to durable object storage.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Error reported by S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Network or connection error while transferring a body
    #[error("Connection error: {0}")]
    Connection(String),
}

impl StoreError {
    /// Whether this error reports a missing object rather than an infrastructure fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Errors raised while partitioning, encoding or hashing a page image.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// A caller-supplied parameter is out of range (tile size, quality)
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// The decoded image cannot be tiled (zero width or height)
    #[error("Invalid image: {width}x{height}")]
    InvalidImage { width: u32, height: u32 },

    /// The source bytes could not be decoded as an image
    #[error("Failed to decode image: {message}")]
    DecodeError { message: String },

    /// A finished tile canvas could not be encoded
    #[error("Failed to encode tile: {message}")]
    EncodeError { message: String },
}

/// Errors returned by the edge cache gateway read paths.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Malformed pamphlet id, hash or page range
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// The descriptor or tile does not exist in storage
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Storage could not be reached or returned a fault
    #[error("Storage unavailable: {0}")]
    StoreUnavailable(StoreError),

    /// The stored descriptor is not valid JSON of the expected shape
    #[error("Invalid descriptor for {pamphlet_id}: {message}")]
    InvalidDescriptor {
        pamphlet_id: String,
        message: String,
    },
}

impl GatewayError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        GatewayError::InvalidParameter {
            message: message.into(),
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(resource) => GatewayError::NotFound { resource },
            other => GatewayError::StoreUnavailable(other),
        }
    }
}

/// A single artifact that failed during a publish.
#[derive(Debug, Clone)]
pub struct ArtifactFailure {
    /// Source page index or tile storage key
    pub artifact: String,

    /// What went wrong
    pub reason: String,
}

impl std::fmt::Display for ArtifactFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.artifact, self.reason)
    }
}

/// Errors that abort a publish.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    /// Publish options are unusable (bad pamphlet id, no pages, zero concurrency)
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// Some artifacts failed, so the descriptor was not written
    #[error("Publish incomplete: {} artifact(s) failed", failures.len())]
    Incomplete { failures: Vec<ArtifactFailure> },

    /// The assembled descriptor violates a grid invariant
    #[error("Invalid descriptor: {message}")]
    Descriptor { message: String },

    /// Storage fault while reading the previous descriptor or writing the new one
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}
