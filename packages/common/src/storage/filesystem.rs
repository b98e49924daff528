use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::BufReader;

use super::error::StorageError;
use super::traits::{ImageStore, StoredFile};

/// Filesystem-backed image store.
///
/// Files live flat in the content directory as `{root}/{uuid}.{ext}`.
/// Writes go through `{root}/.tmp` and are published with a hard link, so a
/// final name is never partially written and never overwritten.
pub struct FilesystemImageStore {
    root: PathBuf,
}

impl FilesystemImageStore {
    /// Create a new filesystem image store, creating the directories if needed.
    pub async fn new(root: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&root).await?;
        fs::create_dir_all(root.join(".tmp")).await?;
        Ok(Self { root })
    }

    /// The content directory.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn file_path(&self, filename: &str) -> Result<PathBuf, StorageError> {
        validate_filename(filename)?;
        Ok(self.root.join(filename))
    }

    fn temp_path(&self) -> PathBuf {
        self.root
            .join(".tmp")
            .join(uuid::Uuid::new_v4().to_string())
    }
}

/// Accept only flat `<stem>.<ext>` names with `[A-Za-z0-9-]` stems and
/// alphanumeric extensions.
fn validate_filename(filename: &str) -> Result<(), StorageError> {
    let invalid = || StorageError::InvalidName(filename.to_string());
    let (stem, ext) = filename.rsplit_once('.').ok_or_else(invalid)?;
    if stem.is_empty() || ext.is_empty() {
        return Err(invalid());
    }
    if !stem.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(invalid());
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid());
    }
    Ok(())
}

#[async_trait]
impl ImageStore for FilesystemImageStore {
    async fn put(&self, filename: &str, data: &[u8]) -> Result<(), StorageError> {
        let final_path = self.file_path(filename)?;

        let temp_path = self.temp_path();
        if let Err(e) = fs::write(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        // hard_link refuses to replace an existing name, unlike rename.
        let published = fs::hard_link(&temp_path, &final_path).await;
        let _ = fs::remove_file(&temp_path).await;

        match published {
            Ok(()) => {
                tracing::debug!(filename, size = data.len(), "Published image file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StorageError::AlreadyExists(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open(&self, filename: &str) -> Result<StoredFile, StorageError> {
        let path = self.file_path(filename)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(filename.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let len = file.metadata().await?.len();
        Ok(StoredFile {
            reader: Box::new(BufReader::new(file)),
            len,
        })
    }

    async fn exists(&self, filename: &str) -> Result<bool, StorageError> {
        let path = self.file_path(filename)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn remove(&self, filename: &str) -> Result<bool, StorageError> {
        let path = self.file_path(filename)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(filename, "Removed image file");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
