//! In-process object store. Keeps every bucket in memory, records each call it
//! receives and can be told to misbehave, which makes it the stand-in for a
//! remote service in tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::{Acl, Bucket, Connection, Credentials, ObjectMeta, Service, roll_up};
use crate::error::{Result, StorageError};
use crate::location::Location;

/// A call received by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Connect,
    CreateBucket(String),
    GetBucket(String),
    Put(String),
    Get(String),
    Lookup(String),
    Delete(String),
    SetAcl(String, Acl),
    List(String),
}

#[derive(Debug, Default, Clone)]
struct Faults {
    refuse_connect: Option<String>,
    refuse_create: Option<String>,
    fail_upload: Option<String>,
    truncate_upload: Option<usize>,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    acl: Acl,
    last_modified: DateTime<Utc>,
}

#[derive(Default)]
struct Journal {
    ops: Mutex<Vec<Op>>,
    faults: Mutex<Faults>,
}

impl Journal {
    async fn record(&self, op: Op) {
        self.ops.lock().await.push(op);
    }
}

#[derive(Clone, Default)]
pub struct MemoryService {
    buckets: Arc<Mutex<HashMap<String, Arc<MemoryBucket>>>>,
    journal: Arc<Journal>,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-create a bucket, as if provisioned by an earlier run.
    pub async fn with_bucket(self, name: &str) -> Self {
        let bucket = MemoryBucket::new(name, self.journal.clone());
        self.buckets
            .lock()
            .await
            .insert(name.to_string(), Arc::new(bucket));
        self
    }

    /// Fail every connection attempt.
    pub async fn refuse_connect(&self, reason: &str) {
        self.journal.faults.lock().await.refuse_connect = Some(reason.to_string());
    }

    /// Fail bucket creation with a non-conflict error.
    pub async fn refuse_create(&self, reason: &str) {
        self.journal.faults.lock().await.refuse_create = Some(reason.to_string());
    }

    /// Make every upload call fail.
    pub async fn fail_uploads(&self, reason: &str) {
        self.journal.faults.lock().await.fail_upload = Some(reason.to_string());
    }

    /// Silently keep only the first `len` bytes of every upload.
    pub async fn truncate_uploads(&self, len: usize) {
        self.journal.faults.lock().await.truncate_upload = Some(len);
    }

    pub async fn ops(&self) -> Vec<Op> {
        self.journal.ops.lock().await.clone()
    }

    pub async fn count(&self, matches: impl Fn(&Op) -> bool) -> usize {
        self.journal.ops.lock().await.iter().filter(|op| matches(op)).count()
    }

    pub async fn object(&self, bucket: &str, key: &str) -> Option<(Bytes, Acl)> {
        let bucket = self.buckets.lock().await.get(bucket).cloned()?;
        let objects = bucket.objects.lock().await;
        objects.get(key).map(|o| (o.data.clone(), o.acl))
    }

    pub async fn has_bucket(&self, name: &str) -> bool {
        self.buckets.lock().await.contains_key(name)
    }
}

#[async_trait]
impl Service for MemoryService {
    async fn connect(&self, _credentials: &Credentials) -> Result<Box<dyn Connection>> {
        self.journal.record(Op::Connect).await;
        if let Some(reason) = self.journal.faults.lock().await.refuse_connect.clone() {
            return Err(StorageError::connection("memory store refused connection", reason));
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl Connection for MemoryService {
    async fn create_bucket(&self, name: &str, _location: Location) -> Result<Arc<dyn Bucket>> {
        self.journal.record(Op::CreateBucket(name.to_string())).await;
        if let Some(reason) = self.journal.faults.lock().await.refuse_create.clone() {
            return Err(StorageError::connection("create bucket failed", reason));
        }
        let mut buckets = self.buckets.lock().await;
        if buckets.contains_key(name) {
            return Err(StorageError::Conflict {
                bucket: name.to_string(),
                reason: "BucketAlreadyOwnedByYou".to_string(),
            });
        }
        let bucket = Arc::new(MemoryBucket::new(name, self.journal.clone()));
        buckets.insert(name.to_string(), bucket.clone());
        Ok(bucket)
    }

    async fn get_bucket(&self, name: &str, _location: Location) -> Result<Arc<dyn Bucket>> {
        self.journal.record(Op::GetBucket(name.to_string())).await;
        let bucket = self
            .buckets
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NoSuchBucket {
                bucket: name.to_string(),
            })?;
        Ok(bucket)
    }
}

pub struct MemoryBucket {
    name: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    journal: Arc<Journal>,
}

impl MemoryBucket {
    fn new(name: &str, journal: Arc<Journal>) -> Self {
        Self {
            name: name.to_string(),
            objects: Mutex::new(BTreeMap::new()),
            journal,
        }
    }
}

#[async_trait]
impl Bucket for MemoryBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()> {
        self.journal.record(Op::Put(key.to_string())).await;
        let faults = self.journal.faults.lock().await.clone();
        if let Some(reason) = faults.fail_upload {
            return Err(StorageError::upload(key, reason));
        }

        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        if let Some(len) = faults.truncate_upload {
            data.truncate(len);
        }

        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                data: Bytes::from(data),
                acl: Acl::Private,
                last_modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()> {
        self.journal.record(Op::Get(key.to_string())).await;
        let data = self
            .objects
            .lock()
            .await
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StorageError::not_found(key))?;
        writer.write_all(&data).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn lookup(&self, key: &str) -> Result<Option<ObjectMeta>> {
        self.journal.record(Op::Lookup(key.to_string())).await;
        let objects = self.objects.lock().await;
        Ok(objects.get(key).map(|o| ObjectMeta {
            key: key.to_string(),
            size: o.data.len() as u64,
            last_modified: o.last_modified,
        }))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.journal.record(Op::Delete(key.to_string())).await;
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn set_acl(&self, key: &str, acl: Acl) -> Result<()> {
        self.journal.record(Op::SetAcl(key.to_string(), acl)).await;
        match self.objects.lock().await.get_mut(key) {
            Some(object) => {
                object.acl = acl;
                Ok(())
            }
            None => Err(StorageError::not_found(key)),
        }
    }

    fn list(self: Arc<Self>, prefix: &str, delimiter: &str) -> BoxStream<'static, Result<String>> {
        let prefix = prefix.to_string();
        let delimiter = delimiter.to_string();
        stream::once(async move {
            self.journal.record(Op::List(prefix.clone())).await;
            let objects = self.objects.lock().await;
            let names = roll_up(objects.keys().map(String::as_str), &prefix, &delimiter);
            Ok::<_, StorageError>(stream::iter(names.into_iter().map(Ok)))
        })
        .try_flatten()
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[tokio::test]
    async fn memory_bucket_roundtrip() {
        let service = MemoryService::new();
        let conn = service.connect(&Credentials::new("a", "b")).await.unwrap();
        let bucket = conn.create_bucket("media", Location::Default).await.unwrap();

        bucket.put("test/hello.txt", &mut Cursor::new(b"world".to_vec())).await.unwrap();
        let meta = bucket.lookup("test/hello.txt").await.unwrap().unwrap();
        assert_eq!(meta.size, 5);

        let mut out = Vec::new();
        bucket.get("test/hello.txt", &mut out).await.unwrap();
        assert_eq!(out, b"world");

        let names: Vec<String> = bucket.clone().list("test/", "/").try_collect().await.unwrap();
        assert_eq!(names, vec!["test/hello.txt"]);

        bucket.delete("test/hello.txt").await.unwrap();
        assert!(bucket.lookup("test/hello.txt").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_create_conflicts() {
        let service = MemoryService::new().with_bucket("media").await;
        let conn = service.connect(&Credentials::new("a", "b")).await.unwrap();
        let err = conn.create_bucket("media", Location::Eu).await.err().unwrap();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn truncation_is_silent() {
        let service = MemoryService::new();
        service.truncate_uploads(3).await;
        let conn = service.connect(&Credentials::new("a", "b")).await.unwrap();
        let bucket = conn.create_bucket("media", Location::Default).await.unwrap();
        bucket.put("k", &mut Cursor::new(b"abcdef".to_vec())).await.unwrap();
        assert_eq!(bucket.lookup("k").await.unwrap().unwrap().size, 3);
    }
}
