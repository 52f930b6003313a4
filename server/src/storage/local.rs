use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::RngCore;
use tokio::fs;
use tracing::{debug, info};

use super::{FetchedObject, ObjectStorage, StorageError, StoredBlob, StoredObject};

const KEY_BYTES: usize = 32;

/// Filesystem-backed object store. Blobs live flat under `base_path` and
/// are published under `public_base_url/<key>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    base_path: PathBuf,
    public_base_url: String,
    max_size: usize,
}

impl LocalObjectStorage {
    pub async fn new(
        base_path: PathBuf,
        public_base_url: impl Into<String>,
        max_size: usize,
    ) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path)
            .await
            .map_err(|source| StorageError::Io {
                key: base_path.display().to_string(),
                source,
            })?;

        info!(path = %base_path.display(), "Object storage initialized");

        Ok(Self {
            base_path,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            max_size,
        })
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(&self, data: Bytes, content_type: &str) -> Result<StoredObject, StorageError> {
        if data.is_empty() {
            return Err(StorageError::Empty);
        }
        if data.len() > self.max_size {
            return Err(StorageError::TooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let checksum = blake3::hash(&data).to_hex().to_string();
        let key = generate_key(content_type);
        let path = self.object_path(&key)?;

        // Write under a temporary name and rename so readers never see a
        // partially written object.
        let partial = self.base_path.join(format!(".{key}.partial"));
        fs::write(&partial, &data)
            .await
            .map_err(|source| StorageError::Io {
                key: key.clone(),
                source,
            })?;
        fs::rename(&partial, &path)
            .await
            .map_err(|source| StorageError::Io {
                key: key.clone(),
                source,
            })?;

        debug!(key = %key, size = data.len(), checksum = %checksum, "Stored object");

        Ok(StoredObject {
            url: self.url_for(&key),
            key,
            checksum,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.object_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key = %key, "Deleted object");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn fetch(&self, key: &str) -> Result<FetchedObject, StorageError> {
        let path = self.object_path(key)?;

        match fs::read(&path).await {
            Ok(data) => Ok(FetchedObject {
                data: Bytes::from(data),
                content_type: content_type_for_key(key),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    async fn list(&self) -> Result<Vec<StoredBlob>, StorageError> {
        let io_err = |source| StorageError::Io {
            key: self.base_path.display().to_string(),
            source,
        };

        let mut blobs = Vec::new();
        let mut entries = fs::read_dir(&self.base_path).await.map_err(io_err)?;

        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_key(&name).is_err() {
                continue;
            }
            let metadata = entry.metadata().await.map_err(io_err)?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            blobs.push(StoredBlob {
                key: name,
                modified,
            });
        }

        Ok(blobs)
    }
}

/// Keys are single path components: no separators, no traversal, no
/// hidden files (temporary uploads are dot-prefixed).
fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = || StorageError::InvalidKey(key.to_string());

    if key.is_empty() || key.starts_with('.') || key.contains(['/', '\\']) {
        return Err(invalid());
    }

    let mut components = Path::new(key).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid()),
    }
}

fn generate_key(content_type: &str) -> String {
    let mut bytes = [0u8; KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}.{}", hex::encode(bytes), extension_for(content_type))
}

const KNOWN_TYPES: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/webp", "webp"),
    ("image/gif", "gif"),
    ("image/svg+xml", "svg"),
    ("application/pdf", "pdf"),
];

fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    KNOWN_TYPES
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
        .unwrap_or("bin")
}

fn content_type_for_key(key: &str) -> &'static str {
    let ext = key.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default();
    KNOWN_TYPES
        .iter()
        .find(|(_, known)| *known == ext)
        .map(|(mime, _)| *mime)
        .unwrap_or("application/octet-stream")
}
