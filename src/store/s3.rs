//! S3-backed object store.
//!
//! Works against AWS S3 and S3-compatible services (MinIO, R2, etc.). An
//! optional root prefix lets several deployments share one bucket.

use async_trait::async_trait;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::warn;

use crate::error::StoreError;

use super::{ListPage, ObjectStore, DEFAULT_DELETE_BATCH};

/// Cache-Control stored on tile objects; their content never changes.
const TILE_OBJECT_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Cache-Control stored on descriptors, which are replaced in place.
const DESCRIPTOR_OBJECT_CACHE_CONTROL: &str = "no-cache";

/// S3 implementation of [`ObjectStore`].
///
/// # Example
///
/// ```ignore
/// use pamphlet_tiles::store::{create_s3_client, S3ObjectStore};
///
/// let client = create_s3_client(None, "us-east-1").await;
/// let store = S3ObjectStore::new(client, "my-bucket".to_string());
///
/// let body = store.get("pamphlets/annual-report/metadata.json").await?;
/// ```
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    root: Option<String>,
}

impl S3ObjectStore {
    /// Create a store over the whole bucket.
    pub fn new(client: Client, bucket: String) -> Self {
        Self {
            client,
            bucket,
            root: None,
        }
    }

    /// Place every key under `root/` inside the bucket.
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        let root = root.into().trim_matches('/').to_string();
        self.root = if root.is_empty() { None } else { Some(root) };
        self
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn full_key(&self, key: &str) -> String {
        match &self.root {
            Some(root) => format!("{}/{}", root, key),
            None => key.to_string(),
        }
    }

    fn strip_root<'a>(&self, key: &'a str) -> &'a str {
        match &self.root {
            Some(root) => key
                .strip_prefix(root.as_str())
                .and_then(|k| k.strip_prefix('/'))
                .unwrap_or(key),
            None => key,
        }
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

/// Map an SDK error to [`StoreError`], recognising missing objects.
fn map_sdk_error<E, R>(err: SdkError<E, R>, location: String, is_missing: bool) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if is_missing {
        return StoreError::NotFound(location);
    }

    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            StoreError::Connection(err.to_string())
        }
        SdkError::ServiceError(service) => {
            let code = service.err().code().unwrap_or("Unknown");
            if code == "NoSuchKey" || code == "NotFound" {
                StoreError::NotFound(location)
            } else {
                let message = service.err().message().unwrap_or_default();
                StoreError::S3(format!("{}: {}", code, message))
            }
        }
        _ => StoreError::S3(err.to_string()),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let full_key = self.full_key(key);

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .send()
            .await
            .map_err(|e| {
                let is_missing = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false)
                    || e
                        .raw_response()
                        .map(|r| r.status().as_u16() == 404)
                        .unwrap_or(false);
                map_sdk_error(e, self.location(&full_key), is_missing)
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?
            .into_bytes();

        Ok(data)
    }

    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), StoreError> {
        let full_key = self.full_key(key);
        let cache_control = if key.contains("/tiles/") {
            TILE_OBJECT_CACHE_CONTROL
        } else {
            DESCRIPTOR_OBJECT_CACHE_CONTROL
        };

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&full_key)
            .content_type(content_type)
            .cache_control(cache_control)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, self.location(&full_key), false))?;

        Ok(())
    }

    async fn list(
        &self,
        prefix: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<ListPage, StoreError> {
        let full_prefix = self.full_key(prefix);
        let max_keys = limit.clamp(1, DEFAULT_DELETE_BATCH) as i32;

        let result = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&full_prefix)
            .max_keys(max_keys)
            .set_continuation_token(cursor.map(str::to_string))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, self.location(&full_prefix), false))?;

        let keys = result
            .contents()
            .iter()
            .filter_map(|obj| obj.key())
            .map(|k| self.strip_root(k).to_string())
            .collect();

        let next_cursor = if result.is_truncated() == Some(true) {
            result.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage { keys, next_cursor })
    }

    async fn delete_batch(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }

        let objects = keys
            .iter()
            .map(|k| {
                ObjectIdentifier::builder()
                    .key(self.full_key(k))
                    .build()
                    .map_err(|e| StoreError::S3(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(true)
            .build()
            .map_err(|e| StoreError::S3(e.to_string()))?;

        let result = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| map_sdk_error(e, format!("s3://{}", self.bucket), false))?;

        // DeleteObjects reports per-key failures in a successful response
        let errors = result.errors();
        if let Some(first) = errors.first() {
            warn!(
                bucket = %self.bucket,
                failed = errors.len(),
                "Batch delete reported failures"
            );
            return Err(StoreError::S3(format!(
                "failed to delete {} key(s), first {}: {}",
                errors.len(),
                first.key().unwrap_or("?"),
                first.message().unwrap_or("unknown error")
            )));
        }

        Ok(())
    }

    fn max_delete_batch(&self) -> usize {
        DEFAULT_DELETE_BATCH
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services usually need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
