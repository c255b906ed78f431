use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use super::{Acl, Bucket, Connection, Credentials, ObjectMeta, Service, roll_up};
use crate::error::{Result, StorageError};
use crate::location::Location;

/// Object store kept in a local directory, one subdirectory per bucket.
pub struct LocalService {
    root: PathBuf,
}

impl LocalService {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            root: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl Service for LocalService {
    async fn connect(&self, _credentials: &Credentials) -> Result<Box<dyn Connection>> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create directory: {}", self.root.display()))?;
        Ok(Box::new(LocalConnection {
            root: self.root.clone(),
        }))
    }
}

struct LocalConnection {
    root: PathBuf,
}

#[async_trait]
impl Connection for LocalConnection {
    async fn create_bucket(&self, name: &str, _location: Location) -> Result<Arc<dyn Bucket>> {
        let dir = self.root.join(name);
        match tokio::fs::create_dir(&dir).await {
            Ok(()) => Ok(Arc::new(LocalBucket::new(name, dir))),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(StorageError::Conflict {
                bucket: name.to_string(),
                reason: format!("{} already exists", dir.display()),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_bucket(&self, name: &str, _location: Location) -> Result<Arc<dyn Bucket>> {
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(StorageError::NoSuchBucket {
                bucket: name.to_string(),
            });
        }
        Ok(Arc::new(LocalBucket::new(name, dir)))
    }
}

pub struct LocalBucket {
    name: String,
    root: PathBuf,
}

impl LocalBucket {
    fn new(name: &str, root: PathBuf) -> Self {
        Self {
            name: name.to_string(),
            root,
        }
    }

    /// Path of `key` inside the bucket directory. Keys that would leave it
    /// (`..`, drive prefixes) or that name no file are rejected.
    fn full_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        let contained = relative.components().next().is_some()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("invalid object key: {key:?}"),
            )
            .into());
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Bucket for LocalBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()> {
        let full = self.full_path(key)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&full)
            .await
            .with_context(|| format!("failed to write: {}", full.display()))?;
        let written = tokio::io::copy(reader, &mut file)
            .await
            .map_err(|e| StorageError::upload(key, e))?;
        file.sync_all().await?;
        debug!(key, written, "stored object");
        Ok(())
    }

    async fn get(&self, key: &str, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()> {
        let full = self.full_path(key)?;
        let mut file = match tokio::fs::File::open(&full).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(key));
            }
            Err(e) => return Err(e.into()),
        };
        tokio::io::copy(&mut file, writer).await?;
        Ok(())
    }

    async fn lookup(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let full = self.full_path(key)?;
        let meta = match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(ObjectMeta {
            key: key.to_string(),
            size: meta.len(),
            last_modified: DateTime::<Utc>::from(meta.modified()?),
        }))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full = self.full_path(key)?;
        if full.is_file() {
            tokio::fs::remove_file(&full).await?;
        }
        Ok(())
    }

    async fn set_acl(&self, key: &str, acl: Acl) -> Result<()> {
        let full = self.full_path(key)?;
        if !full.is_file() {
            return Err(StorageError::not_found(key));
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = match acl {
                Acl::Private => 0o600,
                Acl::PublicRead => 0o644,
            };
            tokio::fs::set_permissions(&full, std::fs::Permissions::from_mode(mode)).await?;
        }
        debug!(key, acl = acl.as_str(), "updated permissions");
        Ok(())
    }

    fn list(self: Arc<Self>, prefix: &str, delimiter: &str) -> BoxStream<'static, Result<String>> {
        let prefix = prefix.to_string();
        let delimiter = delimiter.to_string();
        stream::once(async move {
            let mut keys = Vec::new();
            collect_keys(&self.root, "", &mut keys).await?;
            keys.sort();
            let names = roll_up(keys.iter().map(String::as_str), &prefix, &delimiter);
            Ok::<_, StorageError>(stream::iter(names.into_iter().map(Ok)))
        })
        .try_flatten()
        .boxed()
    }
}

/// Walk `dir` iteratively, pushing every file as a `/`-separated key.
async fn collect_keys(dir: &Path, base: &str, keys: &mut Vec<String>) -> Result<()> {
    let mut pending = vec![(dir.to_path_buf(), base.to_string())];
    while let Some((dir, base)) = pending.pop() {
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let key = format!("{base}{name}");
            if entry.file_type().await?.is_dir() {
                pending.push((entry.path(), format!("{key}/")));
            } else {
                keys.push(key);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[tokio::test]
    async fn local_bucket_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let service = LocalService::new(dir.path());
        let conn = service.connect(&Credentials::new("a", "b")).await.unwrap();
        let bucket = conn.create_bucket("media", Location::Default).await.unwrap();

        bucket.put("test/hello.txt", &mut Cursor::new(b"world".to_vec())).await.unwrap();
        assert_eq!(bucket.lookup("test/hello.txt").await.unwrap().unwrap().size, 5);

        let mut data = Vec::new();
        bucket.get("test/hello.txt", &mut data).await.unwrap();
        assert_eq!(data, b"world");

        let names: Vec<String> = bucket.clone().list("", "/").try_collect().await.unwrap();
        assert_eq!(names, vec!["test/"]);
        let names: Vec<String> = bucket.clone().list("test/", "/").try_collect().await.unwrap();
        assert_eq!(names, vec!["test/hello.txt"]);

        bucket.delete("test/hello.txt").await.unwrap();
        assert!(bucket.lookup("test/hello.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keys_cannot_escape_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        let conn = LocalService::new(&root)
            .connect(&Credentials::new("a", "b"))
            .await
            .unwrap();
        let bucket = conn.create_bucket("media", Location::Default).await.unwrap();

        for key in ["../../outside.txt", "docs/../../escape.txt", "/../x", ""] {
            let err = bucket
                .put(key, &mut Cursor::new(b"pwn".to_vec()))
                .await
                .unwrap_err();
            assert!(
                matches!(err, StorageError::Io(ref e) if e.kind() == std::io::ErrorKind::InvalidInput),
                "{key}: {err}"
            );
            assert!(bucket.lookup(key).await.is_err());
            assert!(bucket.delete(key).await.is_err());
        }
        assert!(!dir.path().join("outside.txt").exists());
        assert!(!root.join("outside.txt").exists());

        bucket.put("/docs/./ok.txt", &mut Cursor::new(b"ok".to_vec())).await.unwrap();
        assert_eq!(bucket.lookup("/docs/./ok.txt").await.unwrap().unwrap().size, 2);
    }

    #[tokio::test]
    async fn storage_save_outside_root_fails() {
        use crate::settings::{Settings, StorageOptions};
        use crate::storage::{BucketStorage, Storage};

        let dir = tempfile::tempdir().unwrap();
        let storage = BucketStorage::with_settings(
            StorageOptions::default().bucket("media").credentials("a", "b"),
            &Settings::default(),
            Arc::new(LocalService::new(dir.path().join("root"))),
        )
        .unwrap();

        let err = storage
            .save("../../outside.txt", &mut Cursor::new(b"pwn".to_vec()))
            .await
            .unwrap_err();
        assert!(err.is_io());
        assert!(!dir.path().join("outside.txt").exists());
    }

    #[tokio::test]
    async fn existing_directory_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("media")).unwrap();
        let conn = LocalService::new(dir.path())
            .connect(&Credentials::new("a", "b"))
            .await
            .unwrap();
        let err = conn.create_bucket("media", Location::Default).await.err().unwrap();
        assert!(matches!(err, StorageError::Conflict { .. }));
        assert!(conn.get_bucket("media", Location::Default).await.is_ok());
        assert!(conn.get_bucket("absent", Location::Default).await.is_err());
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let conn = LocalService::new(dir.path())
            .connect(&Credentials::new("a", "b"))
            .await
            .unwrap();
        let bucket = conn.create_bucket("media", Location::Default).await.unwrap();
        let mut sink = Vec::new();
        let err = bucket.get("nope", &mut sink).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
