//! Error types for asset conversion.

use std::io;
use std::path::PathBuf;

use silvie_decode::DecodeError;
use thiserror::Error;

/// Result alias for conversion operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while converting an asset.
#[derive(Debug, Error)]
pub enum Error {
    /// The model could not be decoded or assembled.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Reading an input or writing an output failed.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The atlas image could not be encoded.
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    /// The scene description could not be serialized.
    #[error("glTF serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
