//! Error types for file operations.

use huffstream_codec::CodecError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File operation errors
#[derive(Debug, Error)]
pub enum FileError {
    /// Reading or writing `path` failed
    #[error("{path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Input did not encode or decode
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Name has no usable final component
    #[error("invalid file name: {0:?}")]
    InvalidName(String),
}

impl FileError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for file operations
pub type Result<T> = std::result::Result<T, FileError>;
