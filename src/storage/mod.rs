// Object storage
// Bucket/key storage contract and its filesystem-backed implementation

#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Bucket not found: {0}")]
    BucketNotFound(String),
    #[error("Key not found: {bucket}/{key}")]
    KeyNotFound { bucket: String, key: String },
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),
    #[error("Invalid bucket name: {0:?}")]
    InvalidBucket(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Flat bucket/key object storage
pub trait ObjectStore: Send + Sync {
    /// Keys under `prefix`, sorted. Prefix matching is plain string matching.
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()>;

    /// Copy an object to a local file, creating parent directories
    fn download(&self, bucket: &str, key: &str, local_path: &Path) -> Result<()> {
        let bytes = self.get(bucket, key)?;
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(local_path, bytes)
            .with_context(|| format!("Failed to write {}", local_path.display()))?;
        Ok(())
    }

    fn upload_file(&self, bucket: &str, key: &str, local_path: &Path) -> Result<()> {
        let bytes = fs::read(local_path)
            .with_context(|| format!("Failed to read {}", local_path.display()))?;
        self.put(bucket, key, &bytes)
    }
}

/// Stores each bucket as a directory under `root` and each key as a
/// slash-delimited relative path inside it
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    #[inline]
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the bucket directory if it is missing
    #[inline]
    pub fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        let dir = self.bucket_path(bucket)?;
        fs::create_dir_all(dir)?;
        Ok(())
    }

    fn bucket_path(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
            return Err(StorageError::InvalidBucket(bucket.to_string()));
        }
        Ok(self.root.join(bucket))
    }

    fn existing_bucket(&self, bucket: &str) -> Result<PathBuf, StorageError> {
        let dir = self.bucket_path(bucket)?;
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(StorageError::BucketNotFound(bucket.to_string()))
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.existing_bucket(bucket)?.join(key))
    }
}

fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..")
        || Path::new(key)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));

    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

impl ObjectStore for LocalObjectStore {
    fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let dir = self.existing_bucket(bucket)?;

        let mut keys = Vec::new();
        for entry in WalkDir::new(&dir).min_depth(1) {
            let entry = entry.with_context(|| format!("Failed to walk bucket {bucket}"))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&dir)
                .with_context(|| format!("Entry outside bucket: {}", entry.path().display()))?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if key.starts_with(prefix) {
                keys.push(key);
            }
        }

        keys.sort();
        debug!("Listed {} keys under {}/{}", keys.len(), bucket, prefix);
        Ok(keys)
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        if !path.is_file() {
            return Err(StorageError::KeyNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }
            .into());
        }

        let bytes = fs::read(&path).map_err(StorageError::from)?;
        debug!("Read {} bytes from {}/{}", bytes.len(), bucket, key);
        Ok(bytes)
    }

    fn put(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(StorageError::from)?;
        }
        fs::write(&path, bytes).map_err(StorageError::from)?;
        debug!("Wrote {} bytes to {}/{}", bytes.len(), bucket, key);
        Ok(())
    }
}
