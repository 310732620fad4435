//! Stores received transfers in a directory.

use crate::error::{FileError, Result};
use crate::naming::{decoded_name, sanitize};
use crate::transcode::write_file;
use async_trait::async_trait;
use huffstream_core::{Error, ReceivedTransfer, TransferSink};
use std::path::{Path, PathBuf};

/// Writes each received container and its reconstruction side by side
///
/// ```text
/// <dir>/report_encoded.txt   container as received
/// <dir>/report_decoded.txt   original bytes
/// ```
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

/// Where one transfer was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPaths {
    /// Container path
    pub container: PathBuf,
    /// Reconstruction path
    pub decoded: PathBuf,
}

impl DirectorySink {
    /// Use `root`, creating it if needed
    ///
    /// # Errors
    /// `Io` if the directory cannot be created
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| FileError::io(&root, e))?;
        tracing::debug!(dir = %root.display(), "directory sink ready");
        Ok(Self { root })
    }

    /// Target directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths a transfer named `name` would be written to
    ///
    /// # Errors
    /// `InvalidName` if `name` has no usable final component
    pub fn paths_for(&self, name: &str) -> Result<StoredPaths> {
        let base = sanitize(name)?;
        Ok(StoredPaths {
            container: self.root.join(base),
            decoded: self.root.join(decoded_name(base)),
        })
    }

    /// Write both files for `transfer`
    ///
    /// # Errors
    /// `InvalidName` or `Io`
    pub async fn write(&self, transfer: &ReceivedTransfer) -> Result<StoredPaths> {
        let paths = self.paths_for(&transfer.name)?;
        write_file(&paths.container, &transfer.container).await?;
        write_file(&paths.decoded, &transfer.data).await?;

        tracing::info!(
            session = %transfer.session_id,
            transfer = %transfer.transfer_id,
            container = %paths.container.display(),
            decoded = %paths.decoded.display(),
            "transfer stored"
        );
        Ok(paths)
    }
}

#[async_trait]
impl TransferSink for DirectorySink {
    async fn store(&self, transfer: &ReceivedTransfer) -> huffstream_core::Result<()> {
        self.write(transfer)
            .await
            .map(|_| ())
            .map_err(|e| Error::Storage(e.to_string()))
    }
}
