pub mod local;
pub mod memory;
pub mod s3;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::location::Location;

/// Entry point of an object-storage service.
#[async_trait]
pub trait Service: Send + Sync {
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn Connection>>;
}

/// An authenticated session with the service.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Create a bucket. Fails with `StorageError::Conflict` if it already
    /// exists or belongs to another account.
    async fn create_bucket(&self, name: &str, location: Location) -> Result<Arc<dyn Bucket>>;

    async fn get_bucket(&self, name: &str, location: Location) -> Result<Arc<dyn Bucket>>;
}

#[async_trait]
pub trait Bucket: Send + Sync {
    fn name(&self) -> &str;

    /// Upload everything `reader` yields to `key`.
    async fn put(&self, key: &str, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()>;

    /// Download `key` into `writer`.
    async fn get(&self, key: &str, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()>;

    async fn lookup(&self, key: &str) -> Result<Option<ObjectMeta>>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn set_acl(&self, key: &str, acl: Acl) -> Result<()>;

    /// Names under `prefix`: object keys, plus common prefixes rolled up at
    /// `delimiter`.
    fn list(self: Arc<Self>, prefix: &str, delimiter: &str) -> BoxStream<'static, Result<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acl {
    Private,
    PublicRead,
}

impl Acl {
    pub fn as_str(self) -> &'static str {
        match self {
            Acl::Private => "private",
            Acl::PublicRead => "public-read",
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key: String,
    secret_key: String,
}

impl Credentials {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Split a listing of `keys` under `prefix` into plain keys and common
/// prefixes rolled up at `delimiter`, in key order.
pub(crate) fn roll_up<'a>(
    keys: impl IntoIterator<Item = &'a str>,
    prefix: &str,
    delimiter: &str,
) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for key in keys {
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };
        let name = match rest.find(delimiter) {
            Some(idx) if !delimiter.is_empty() => {
                format!("{prefix}{}", &rest[..idx + delimiter.len()])
            }
            _ => key.to_string(),
        };
        if names.last() != Some(&name) {
            names.push(name);
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roll_up_groups_common_prefixes() {
        let keys = ["a.txt", "docs/x.pdf", "docs/y.pdf", "img/z.png", "zz"];
        let names = roll_up(keys, "", "/");
        assert_eq!(names, vec!["a.txt", "docs/", "img/", "zz"]);
    }

    #[test]
    fn roll_up_keeps_full_names_under_prefix() {
        let keys = ["docs/a/1", "docs/a/2", "docs/b", "other"];
        let names = roll_up(keys, "docs/", "/");
        assert_eq!(names, vec!["docs/a/", "docs/b"]);
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let creds = Credentials::new("AKIA", "topsecret");
        let out = format!("{creds:?}");
        assert!(out.contains("AKIA"));
        assert!(!out.contains("topsecret"));
    }
}
