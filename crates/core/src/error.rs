use std::io;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = StorageError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Bucket creation refused because it already exists or belongs to someone else.
    #[error("bucket '{bucket}' could not be created: {reason}")]
    Conflict { bucket: String, reason: String },

    #[error("connection to object storage failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("error during uploading file '{key}'")]
    Upload {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("error during saving file '{key}': saved {saved} of {expected} bytes")]
    IntegrityMismatch { key: String, saved: u64, expected: u64 },

    #[error("object not found: {key}")]
    NotFound { key: String },

    #[error("bucket not found: {bucket}")]
    NoSuchBucket { bucket: String },

    #[error("{op} '{key}' returned status {status}")]
    Remote {
        op: &'static str,
        key: String,
        status: u16,
    },

    #[error("unknown bucket location: {0}")]
    UnknownLocation(String),

    #[error("missing configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StorageError {
    pub fn connection(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn upload(key: &str, source: impl Into<BoxError>) -> Self {
        Self::Upload {
            key: key.to_string(),
            source: source.into(),
        }
    }

    pub fn not_found(key: &str) -> Self {
        Self::NotFound {
            key: key.to_string(),
        }
    }

    /// Upload and integrity failures, and local I/O, are I/O-class errors.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::Upload { .. } | Self::IntegrityMismatch { .. } | Self::Io(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } | Self::NoSuchBucket { .. } => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

impl From<StorageError> for io::Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Io(e) => e,
            e if e.is_not_found() => io::Error::new(io::ErrorKind::NotFound, e),
            e => io::Error::other(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_message_names_key_and_sizes() {
        let err = StorageError::IntegrityMismatch {
            key: "docs/report.pdf".into(),
            saved: 10,
            expected: 42,
        };
        assert!(err.is_io());
        let msg = err.to_string();
        assert!(msg.contains("docs/report.pdf"));
        assert!(msg.contains("10"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn not_found_maps_to_io_kind() {
        let err: io::Error = StorageError::not_found("missing.txt").into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err: io::Error = StorageError::upload("a", "reset by peer").into();
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn upload_keeps_cause() {
        use std::error::Error as _;
        let err = StorageError::upload("a.txt", "connection reset");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("connection reset"));
    }
}
