use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use s3::BucketConfiguration;
use s3::bucket::Bucket as S3Bucket;
use s3::creds::Credentials as S3Credentials;
use s3::error::S3Error;
use s3::region::Region;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::{Acl, Bucket, Connection, Credentials, ObjectMeta, Service};
use crate::error::{Result, StorageError};
use crate::location::Location;

const ACL_URL_EXPIRY_SECS: u32 = 300;

/// Amazon S3, or any S3-compatible service when an endpoint is given.
#[derive(Debug, Clone, Default)]
pub struct S3Service {
    endpoint: Option<String>,
}

impl S3Service {
    pub fn new(endpoint: Option<String>) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl Service for S3Service {
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn Connection>> {
        let credentials = S3Credentials::new(
            Some(credentials.access_key()),
            Some(credentials.secret_key()),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::connection("invalid S3 credentials", e))?;
        Ok(Box::new(S3Connection {
            credentials,
            endpoint: self.endpoint.clone(),
            http: reqwest::Client::new(),
        }))
    }
}

struct S3Connection {
    credentials: S3Credentials,
    endpoint: Option<String>,
    http: reqwest::Client,
}

impl S3Connection {
    fn region(&self, location: Location) -> Region {
        region_for(location, self.endpoint.as_deref())
    }

    fn wrap(&self, bucket: Box<S3Bucket>) -> Arc<dyn Bucket> {
        Arc::new(S3ObjectBucket {
            name: bucket.name(),
            bucket,
            http: self.http.clone(),
        })
    }
}

#[async_trait]
impl Connection for S3Connection {
    async fn create_bucket(&self, name: &str, location: Location) -> Result<Arc<dyn Bucket>> {
        let region = self.region(location);
        let config = BucketConfiguration::default();
        let response = if self.endpoint.is_some() {
            S3Bucket::create_with_path_style(name, region, self.credentials.clone(), config).await
        } else {
            S3Bucket::create(name, region, self.credentials.clone(), config).await
        }
        .map_err(|e| client_error("CREATE BUCKET", name, e))?;

        create_outcome(name, response.response_code, &response.response_text)?;
        debug!(bucket = name, %location, "bucket created");
        Ok(self.wrap(response.bucket))
    }

    async fn get_bucket(&self, name: &str, location: Location) -> Result<Arc<dyn Bucket>> {
        let mut bucket = S3Bucket::new(name, self.region(location), self.credentials.clone())
            .map_err(|e| client_error("GET BUCKET", name, e))?;
        if self.endpoint.is_some() {
            bucket = bucket.with_path_style();
        }

        let (_, status) = bucket
            .list_page(String::new(), None, None, None, Some(1))
            .await
            .map_err(|e| client_error("GET BUCKET", name, e))?;
        match status {
            200..=299 => Ok(self.wrap(bucket)),
            404 => Err(StorageError::NoSuchBucket {
                bucket: name.to_string(),
            }),
            status => Err(StorageError::Remote {
                op: "GET BUCKET",
                key: name.to_string(),
                status,
            }),
        }
    }
}

pub struct S3ObjectBucket {
    name: String,
    bucket: Box<S3Bucket>,
    http: reqwest::Client,
}

fn region_for(location: Location, endpoint: Option<&str>) -> Region {
    match endpoint {
        Some(endpoint) => Region::Custom {
            region: match location.constraint() {
                "" => "us-east-1".to_string(),
                constraint => constraint.to_string(),
            },
            endpoint: endpoint.to_string(),
        },
        None => match location {
            Location::Default => Region::UsEast1,
            Location::Eu => Region::EuWest1,
            Location::UsWest => Region::UsWest1,
            Location::UsWest2 => Region::UsWest2,
            Location::SaEast => Region::SaEast1,
            Location::ApNortheast => Region::ApNortheast1,
            Location::ApSoutheast => Region::ApSoutheast1,
            Location::ApSoutheast2 => Region::ApSoutheast2,
            Location::CnNorth1 => Region::CnNorth1,
        },
    }
}

/// Any non-2xx answer to a create request means the bucket was not created
/// and is worth fetching instead (exists, owned elsewhere, other region).
fn create_outcome(bucket: &str, status: u16, body: &str) -> Result<()> {
    if is_success(status) {
        return Ok(());
    }
    Err(StorageError::Conflict {
        bucket: bucket.to_string(),
        reason: format!("status {status}: {body}"),
    })
}

/// Listing state after a page: `Some(token)` while more pages remain.
fn next_page(is_truncated: bool, token: Option<String>) -> Option<Option<String>> {
    match token {
        Some(token) if is_truncated => Some(Some(token)),
        _ => None,
    }
}

fn client_error(op: &str, key: &str, err: S3Error) -> StorageError {
    StorageError::connection(format!("S3 {op} failed: {key}"), err)
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

#[async_trait]
impl Bucket for S3ObjectBucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, key: &str, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        let response = self
            .bucket
            .put_object(key, &data)
            .await
            .map_err(|e| StorageError::upload(key, e))?;
        let status = response.status_code();
        if !is_success(status) {
            return Err(StorageError::upload(
                key,
                format!("S3 PUT returned status {status}"),
            ));
        }
        debug!(key, bytes = data.len(), "S3 PUT");
        Ok(())
    }

    async fn get(&self, key: &str, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()> {
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|e| client_error("GET", key, e))?;
        match response.status_code() {
            404 => Err(StorageError::not_found(key)),
            status if !is_success(status) => Err(StorageError::Remote {
                op: "S3 GET",
                key: key.to_string(),
                status,
            }),
            _ => {
                writer.write_all(response.bytes()).await?;
                writer.flush().await?;
                Ok(())
            }
        }
    }

    async fn lookup(&self, key: &str) -> Result<Option<ObjectMeta>> {
        let (head, status) = self
            .bucket
            .head_object(key)
            .await
            .map_err(|e| client_error("HEAD", key, e))?;
        match status {
            404 => Ok(None),
            status if !is_success(status) => Err(StorageError::Remote {
                op: "S3 HEAD",
                key: key.to_string(),
                status,
            }),
            _ => {
                let last_modified = head
                    .last_modified
                    .as_deref()
                    .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
                    .map(|t| t.with_timezone(&Utc))
                    .ok_or_else(|| {
                        anyhow::anyhow!("S3 HEAD {key}: missing or invalid Last-Modified")
                    })?;
                Ok(Some(ObjectMeta {
                    key: key.to_string(),
                    size: head.content_length.unwrap_or(0).max(0) as u64,
                    last_modified,
                }))
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .bucket
            .delete_object(key)
            .await
            .map_err(|e| client_error("DELETE", key, e))?;
        match response.status_code() {
            status if is_success(status) || status == 404 => Ok(()),
            status => Err(StorageError::Remote {
                op: "S3 DELETE",
                key: key.to_string(),
                status,
            }),
        }
    }

    async fn set_acl(&self, key: &str, acl: Acl) -> Result<()> {
        let queries = HashMap::from([
            ("acl".to_string(), String::new()),
            ("x-amz-acl".to_string(), acl.as_str().to_string()),
        ]);
        let url = self
            .bucket
            .presign_put(key, ACL_URL_EXPIRY_SECS, None, Some(queries))
            .await
            .map_err(|e| client_error("PUT ACL", key, e))?;
        let response = self
            .http
            .put(&url)
            .send()
            .await
            .map_err(|e| StorageError::connection(format!("S3 PUT ACL failed: {key}"), e))?;
        let status = response.status().as_u16();
        if !is_success(status) {
            return Err(StorageError::Remote {
                op: "S3 PUT ACL",
                key: key.to_string(),
                status,
            });
        }
        debug!(key, acl = acl.as_str(), "S3 PUT ACL");
        Ok(())
    }

    fn list(self: Arc<Self>, prefix: &str, delimiter: &str) -> BoxStream<'static, Result<String>> {
        let prefix = prefix.to_string();
        let delimiter = delimiter.to_string();
        // `Some(token)` while pages remain; the first page has no token.
        let start: Option<Option<String>> = Some(None);
        stream::try_unfold(start, move |state| {
            let this = self.clone();
            let prefix = prefix.clone();
            let delimiter = delimiter.clone();
            async move {
                let Some(token) = state else {
                    return Ok(None);
                };
                let (page, status) = this
                    .bucket
                    .list_page(prefix.clone(), Some(delimiter), token, None, None)
                    .await
                    .map_err(|e| client_error("LIST", &prefix, e))?;
                if !is_success(status) {
                    return Err(StorageError::Remote {
                        op: "S3 LIST",
                        key: prefix,
                        status,
                    });
                }

                let mut names: Vec<String> = page.contents.into_iter().map(|o| o.key).collect();
                names.extend(
                    page.common_prefixes
                        .into_iter()
                        .flatten()
                        .map(|p| p.prefix),
                );
                names.sort();

                let next = next_page(page.is_truncated, page.next_continuation_token);
                Ok::<_, StorageError>(Some((stream::iter(names.into_iter().map(Ok)), next)))
            }
        })
        .try_flatten()
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_map_to_regions() {
        assert!(matches!(region_for(Location::Default, None), Region::UsEast1));
        assert!(matches!(region_for(Location::Eu, None), Region::EuWest1));
        assert!(matches!(region_for(Location::ApSoutheast2, None), Region::ApSoutheast2));
        assert!(matches!(region_for(Location::CnNorth1, None), Region::CnNorth1));
    }

    #[test]
    fn endpoint_uses_custom_region() {
        match region_for(Location::Default, Some("http://localhost:9000")) {
            Region::Custom { region, endpoint } => {
                assert_eq!(region, "us-east-1");
                assert_eq!(endpoint, "http://localhost:9000");
            }
            other => panic!("unexpected region {other:?}"),
        }
        match region_for(Location::UsWest2, Some("http://minio:9000")) {
            Region::Custom { region, .. } => assert_eq!(region, "us-west-2"),
            other => panic!("unexpected region {other:?}"),
        }
    }

    #[test]
    fn every_failed_create_status_falls_back_to_fetch() {
        assert!(create_outcome("media", 200, "").is_ok());
        for status in [400, 403, 409, 500] {
            let err = create_outcome("media", status, "IllegalLocationConstraintException").unwrap_err();
            match err {
                StorageError::Conflict { bucket, reason } => {
                    assert_eq!(bucket, "media");
                    assert!(reason.contains(&status.to_string()));
                    assert!(reason.contains("IllegalLocationConstraintException"));
                }
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn pagination_stops_when_not_truncated() {
        assert_eq!(next_page(true, Some("t1".into())), Some(Some("t1".to_string())));
        assert_eq!(next_page(false, Some("t1".into())), None);
        assert_eq!(next_page(true, None), None);
        assert_eq!(next_page(false, None), None);
    }
}
