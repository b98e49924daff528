use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::error::StorageError;

/// Type alias for a boxed async reader.
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// An opened stored file and its length in bytes.
pub struct StoredFile {
    pub reader: BoxReader,
    pub len: u64,
}

/// Durable storage for image files keyed by `<uuid>.<ext>`.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Persist bytes under `filename`.
    ///
    /// Either the complete file becomes visible under `filename` or nothing
    /// does. Fails with [`StorageError::AlreadyExists`] if the name is taken.
    async fn put(&self, filename: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Open a stored file for streaming.
    async fn open(&self, filename: &str) -> Result<StoredFile, StorageError>;

    /// Read a stored file fully into memory.
    async fn read(&self, filename: &str) -> Result<Vec<u8>, StorageError> {
        let mut file = self.open(filename).await?;
        let mut buf = Vec::with_capacity(file.len as usize);
        file.reader.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Check whether a file exists.
    async fn exists(&self, filename: &str) -> Result<bool, StorageError>;

    /// Remove a stored file.
    ///
    /// Returns `true` if the file was removed, `false` if it did not exist.
    async fn remove(&self, filename: &str) -> Result<bool, StorageError>;
}
