use std::io::SeekFrom;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::io::{AsyncRead, AsyncSeek, AsyncSeekExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backend::{Acl, Bucket, ObjectMeta, Service};
use crate::error::{Result, StorageError};
use crate::settings::{Settings, StorageConfig, StorageOptions};

/// Characters left as-is when a key is placed in a URL path.
const KEY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'/');

const DELIMITER: &str = "/";

/// Seekable byte source accepted by [`Storage::save`].
pub trait ReadSeek: AsyncRead + AsyncSeek + Unpin + Send {}

impl<T: AsyncRead + AsyncSeek + Unpin + Send + ?Sized> ReadSeek for T {}

/// Lazily produced names returned by [`Storage::listdir`].
pub type NameStream = BoxStream<'static, Result<String>>;

/// Generic file storage contract.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `content` under `name` and return the name it was stored as.
    async fn save(&self, name: &str, content: &mut dyn ReadSeek) -> Result<String>;

    /// Fetch `name` into a local temporary file positioned at the start.
    async fn open(&self, name: &str) -> Result<tokio::fs::File>;

    async fn delete(&self, name: &str) -> Result<()>;

    async fn exists(&self, name: &str) -> Result<bool>;

    /// Directories and files under `path`.
    async fn listdir(&self, path: &str) -> Result<(Vec<String>, NameStream)>;

    async fn size(&self, name: &str) -> Result<u64>;

    fn url(&self, name: &str) -> String;

    async fn modified_time(&self, name: &str) -> Result<DateTime<Utc>>;

    async fn created_time(&self, name: &str) -> Result<DateTime<Utc>> {
        self.modified_time(name).await
    }

    async fn accessed_time(&self, name: &str) -> Result<DateTime<Utc>> {
        self.modified_time(name).await
    }
}

/// File storage backed by one object-storage bucket.
///
/// The bucket is resolved on first use: created with the configured
/// placement, or fetched when creation reports that it already exists. The
/// result is kept for the lifetime of the instance.
pub struct BucketStorage {
    config: StorageConfig,
    service: Arc<dyn Service>,
    bucket: Mutex<Option<Arc<dyn Bucket>>>,
}

impl BucketStorage {
    /// Build a storage on top of `service`, filling unset options from the
    /// process-wide [`Settings`].
    pub fn new(options: StorageOptions, service: Arc<dyn Service>) -> Result<Self> {
        Self::with_settings(options, Settings::global(), service)
    }

    pub fn with_settings(
        options: StorageOptions,
        settings: &Settings,
        service: Arc<dyn Service>,
    ) -> Result<Self> {
        let config = StorageConfig::resolve(options, settings)?;
        Ok(Self {
            config,
            service,
            bucket: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// The resolved bucket, creating or fetching it on the first call.
    pub async fn bucket(&self) -> Result<Arc<dyn Bucket>> {
        let mut guard = self.bucket.lock().await;
        if let Some(bucket) = guard.as_ref() {
            return Ok(bucket.clone());
        }

        let name = &self.config.bucket_name;
        let location = self.config.location;
        let conn = self.service.connect(&self.config.credentials).await?;
        let bucket = match conn.create_bucket(name, location).await {
            Ok(bucket) => {
                info!(bucket = %name, %location, "Bucket created");
                bucket
            }
            Err(StorageError::Conflict { reason, .. }) => {
                warn!(bucket = %name, %reason, "bucket not created, fetching existing one");
                conn.get_bucket(name, location).await?
            }
            Err(e) => return Err(e),
        };

        *guard = Some(bucket.clone());
        Ok(bucket)
    }

    async fn lookup(&self, name: &str) -> Result<ObjectMeta> {
        self.bucket()
            .await?
            .lookup(name)
            .await?
            .ok_or_else(|| StorageError::not_found(name))
    }
}

#[async_trait]
impl Storage for BucketStorage {
    async fn save(&self, name: &str, content: &mut dyn ReadSeek) -> Result<String> {
        let bucket = self.bucket().await?;
        content.seek(SeekFrom::Start(0)).await?;

        match bucket.put(name, &mut &mut *content).await {
            Ok(()) => {}
            Err(e @ StorageError::Upload { .. }) => return Err(e),
            Err(e) => return Err(StorageError::upload(name, e)),
        }

        let expected = content.seek(SeekFrom::End(0)).await?;
        let saved = bucket.lookup(name).await?.map_or(0, |meta| meta.size);

        if saved != expected {
            warn!(key = %name, saved, expected, "upload size mismatch, removing object");
            bucket.delete(name).await?;
            return Err(StorageError::IntegrityMismatch {
                key: name.to_string(),
                saved,
                expected,
            });
        }

        bucket.set_acl(name, Acl::PublicRead).await?;
        info!(bucket = %bucket.name(), key = %name, bytes = saved, "File saved");
        Ok(name.to_string())
    }

    async fn open(&self, name: &str) -> Result<tokio::fs::File> {
        let bucket = self.bucket().await?;
        let mut file = tokio::fs::File::from_std(tempfile::tempfile()?);
        bucket.get(name, &mut file).await?;
        file.seek(SeekFrom::Start(0)).await?;
        debug!(key = %name, "opened");
        Ok(file)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.bucket().await?.delete(name).await
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.bucket().await?.lookup(name).await?.is_some())
    }

    async fn listdir(&self, path: &str) -> Result<(Vec<String>, NameStream)> {
        let bucket = self.bucket().await?;
        Ok((Vec::new(), bucket.list(path, DELIMITER)))
    }

    async fn size(&self, name: &str) -> Result<u64> {
        Ok(self.lookup(name).await?.size)
    }

    fn url(&self, name: &str) -> String {
        public_url(&self.config.bucket_name, &self.config.host, name)
    }

    async fn modified_time(&self, name: &str) -> Result<DateTime<Utc>> {
        Ok(self.lookup(name).await?.last_modified)
    }
}

/// Plain-HTTP virtual-host URL of `key` in `bucket`.
pub fn public_url(bucket: &str, host: &str, key: &str) -> String {
    let escaped = utf8_percent_encode(key, KEY_ESCAPE).to_string();
    if escaped.starts_with('/') {
        format!("http://{bucket}.{host}{escaped}")
    } else {
        format!("http://{bucket}.{host}/{escaped}")
    }
}
