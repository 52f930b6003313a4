//! Object storage gateway.
//!
//! The authoring engine only ever stores URLs; this module turns uploads
//! into URLs and URLs back into keys it can delete.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub mod local;

pub use local::LocalObjectStorage;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Empty upload")]
    Empty,

    #[error("Upload too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("I/O error on object {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result of a successful upload.
#[derive(Debug, Clone, Serialize)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    /// Hex BLAKE3 digest of the payload.
    pub checksum: String,
}

/// A blob as seen when listing the store.
#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub key: String,
    pub modified: DateTime<Utc>,
}

/// A blob read back for serving.
#[derive(Debug, Clone)]
pub struct FetchedObject {
    pub data: Bytes,
    pub content_type: &'static str,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, data: Bytes, content_type: &str) -> Result<StoredObject, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn fetch(&self, key: &str) -> Result<FetchedObject, StorageError>;

    async fn list(&self) -> Result<Vec<StoredBlob>, StorageError>;
}

/// Derives the storage key from a stored URL: the last path segment, with
/// any query string or fragment dropped.
pub fn key_from_url(url: &str) -> Option<&str> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}
