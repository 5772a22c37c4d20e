//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use async_trait::async_trait;
use attache_core::AppError;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Stream of object bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("File {} not found", key)),
            StorageError::InvalidKey(msg) => AppError::BadRequest(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Storage abstraction trait
///
/// A backend owns a flat namespace of objects addressed by key. The staging backend must
/// support [`Storage::append`]; permanent backends may leave the default implementation.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write an object, replacing any previous content.
    async fn store(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Write an object from a stream, returning the number of bytes written.
    async fn store_stream(&self, key: &str, stream: ByteStream) -> StorageResult<u64>;

    /// Append bytes to an object, creating it if absent, and return its new size.
    ///
    /// The bytes are durable when this returns.
    async fn append(&self, key: &str, _data: &[u8]) -> StorageResult<u64> {
        Err(StorageError::Unsupported(format!("append to {}", key)))
    }

    /// Read a whole object into memory
    async fn read(&self, key: &str) -> StorageResult<Bytes>;

    /// Read an object as a stream (for large files)
    async fn read_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Size in bytes of an existing object
    async fn size(&self, key: &str) -> StorageResult<u64>;

    /// Check if an object exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Copy an object within this backend
    async fn copy(&self, from_key: &str, to_key: &str) -> StorageResult<()>;
}
