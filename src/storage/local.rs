use std::path::{Path, PathBuf};
use bytes::Bytes;
use chrono::Utc;
use super::StorageError;
use tokio::{fs, io::{AsyncRead, AsyncWriteExt}};

use crate::utils::{is_safe_name, timestamped_filename};

/// Local filesystem storage for uploaded images.
#[derive(Clone, Debug)]
pub struct LocalDiskStore {
    root: PathBuf, // Directory every stored file lives in
}

impl LocalDiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the storage root if it does not exist yet.
    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Persists `reader` as `<UTC timestamp>_<original_name>` and returns the stored name.
    ///
    /// Two uploads with the same original name inside the same second share a
    /// stored name; the later one replaces the earlier.
    pub async fn save<R>(&self, original_name: &str, reader: &mut R) -> Result<String, StorageError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let filename = timestamped_filename(Utc::now(), original_name);
        if !is_safe_name(&filename) {
            return Err(StorageError::InvalidName(original_name.to_string()));
        }
        let full_path = self.root.join(&filename);

        let mut file = fs::File::create(&full_path).await?;
        let written = match tokio::io::copy(reader, &mut file).await {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&full_path).await;
                return Err(e.into());
            }
        };
        file.flush().await?;

        tracing::info!("Saved file at {:?} ({} bytes)", full_path, written);

        Ok(filename)
    }

    /// Reads a stored file back by its exact name.
    pub async fn read(&self, name: &str) -> Result<Bytes, StorageError> {
        // Checked before any filesystem access
        if !is_safe_name(name) {
            return Err(StorageError::InvalidName(name.to_string()));
        }

        let full_path = self.root.join(name);
        if !fs::try_exists(&full_path).await? {
            return Err(StorageError::NotFound(name.to_string()));
        }

        let content = fs::read(&full_path).await?;
        Ok(Bytes::from(content))
    }
}
