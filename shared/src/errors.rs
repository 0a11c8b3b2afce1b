use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// How a queued operation settled, as seen by the caller that submitted it.
#[derive(Error, Debug)]
pub enum TaskError<E> {
    #[error("Queued operation failed: {0}")]
    Failed(E),

    #[error("Queued operation panicked before settling.")]
    Panicked,

    /// The drain loop went away without settling the operation, e.g. on runtime shutdown.
    #[error("Queued operation was dropped before settling.")]
    Dropped,
}

#[derive(Error, Debug)]
pub enum PreloadError {
    #[error("Invalid media URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: &'static str },

    #[error("Could not read media at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Media at {path:?} contains no data.")]
    Empty { path: PathBuf },

    #[error("Media at {path:?} is not a recognised video container.")]
    UnrecognizedContainer { path: PathBuf },

    #[error("Media loader panicked while preloading {url:?}.")]
    LoaderPanicked { url: String },
}

#[derive(Error, Debug)]
pub enum ThumbnailError {
    #[error("Could not resolve thumbnail: {0}")]
    Resolve(#[from] PreloadError),

    #[error("Could not decode thumbnail at {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Thumbnail decoding task was lost: {0}")]
    DecodeTaskLost(#[from] tokio::task::JoinError),
}
