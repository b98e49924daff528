use thiserror::Error;

/// Errors that can occur during image storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested file was not found.
    #[error("stored file not found: {0}")]
    NotFound(String),
    /// A file already exists under the final name. Stored names are write-once.
    #[error("stored file already exists: {0}")]
    AlreadyExists(String),
    /// The filename is not a flat `<name>.<ext>` token.
    #[error("invalid stored filename: {0}")]
    InvalidName(String),
    /// An I/O error occurred.
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
}
