use std::path::{Component, Path, PathBuf};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::trace;

use crate::errors::PreloadError;

mod container;

pub use container::MediaContainer;

pub const DEFAULT_MIN_BUFFERED_BYTES: u64 = 256 * 1024;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// What a successful preload managed to buffer.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub struct PreloadReceipt {
    pub buffered_bytes: u64,

    /// `None` when container checks are disabled and nothing was recognised.
    pub container: Option<MediaContainer>,
}

/// Buffers a single media resource far enough for it to be playable.
///
/// Implementations own whatever handle they open for the attempt and must release it
/// before the returned future settles, on success and on failure alike.
pub trait MediaLoader: Send + Sync {
    fn preload<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<PreloadReceipt, PreloadError>>;
}


fn has_url_scheme(url: &str) -> bool {
    match url.split_once("://") {
        Some((scheme, _)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|character| character.is_ascii_alphanumeric() || "+-.".contains(character))
        }
        None => false,
    }
}

/// Maps a site-relative media URL (`/videos/a.mp4`, `file:///videos/a.mp4`, `videos/a.mp4?v=2`)
/// onto a path under `media_root`. Parent-directory components and any scheme other than
/// `file://` are refused.
pub fn resolve_media_path(media_root: &Path, url: &str) -> Result<PathBuf, PreloadError> {
    let without_scheme = match url.strip_prefix("file://") {
        Some(stripped) => stripped,
        None if has_url_scheme(url) => {
            return Err(PreloadError::InvalidUrl {
                url: url.to_string(),
                reason: "unsupported scheme",
            });
        }
        None => url,
    };
    let without_suffix = without_scheme
        .split(|character: char| character == '?' || character == '#')
        .next()
        .unwrap_or_default();
    let relative = without_suffix.trim_start_matches('/');

    if relative.is_empty() {
        return Err(PreloadError::InvalidUrl {
            url: url.to_string(),
            reason: "no path",
        });
    }

    let relative_path = Path::new(relative);
    for component in relative_path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => {
                return Err(PreloadError::InvalidUrl {
                    url: url.to_string(),
                    reason: "path escapes the media root",
                });
            }
        }
    }

    Ok(media_root.join(relative_path))
}


/// Preloads media straight from a directory on disk.
///
/// A preload succeeds once `min_buffered_bytes` have been read (or the whole file, if it is
/// smaller). The file handle only lives for the duration of one attempt.
pub struct FsMediaLoader {
    media_root: PathBuf,

    min_buffered_bytes: u64,

    require_known_container: bool,
}

impl FsMediaLoader {
    pub fn new(media_root: PathBuf) -> Self {
        Self {
            media_root,
            min_buffered_bytes: DEFAULT_MIN_BUFFERED_BYTES,
            require_known_container: true,
        }
    }

    pub fn with_min_buffered_bytes(mut self, min_buffered_bytes: u64) -> Self {
        self.min_buffered_bytes = min_buffered_bytes.max(1);
        self
    }

    pub fn with_container_check(mut self, require_known_container: bool) -> Self {
        self.require_known_container = require_known_container;
        self
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    async fn buffer_file(&self, url: &str) -> Result<PreloadReceipt, PreloadError> {
        let path = resolve_media_path(&self.media_root, url)?;

        let mut file = File::open(&path)
            .await
            .map_err(|source| PreloadError::Io {
                path: path.clone(),
                source,
            })?;

        let mut leading_bytes: Vec<u8> = Vec::with_capacity(MediaContainer::SIGNATURE_LENGTH);
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        let mut buffered_bytes: u64 = 0;

        while buffered_bytes < self.min_buffered_bytes {
            let read = file
                .read(&mut chunk)
                .await
                .map_err(|source| PreloadError::Io {
                    path: path.clone(),
                    source,
                })?;

            if read == 0 {
                break;
            }

            let missing_signature_bytes =
                MediaContainer::SIGNATURE_LENGTH.saturating_sub(leading_bytes.len());
            leading_bytes.extend_from_slice(&chunk[..read.min(missing_signature_bytes)]);

            buffered_bytes += read as u64;
        }

        drop(file);

        if buffered_bytes == 0 {
            return Err(PreloadError::Empty { path });
        }

        let container = MediaContainer::sniff(&leading_bytes);
        if container.is_none() && self.require_known_container {
            return Err(PreloadError::UnrecognizedContainer { path });
        }

        trace!(
            url = url,
            buffered_bytes = buffered_bytes,
            "Buffered media from disk."
        );

        Ok(PreloadReceipt {
            buffered_bytes,
            container,
        })
    }
}

impl MediaLoader for FsMediaLoader {
    fn preload<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<PreloadReceipt, PreloadError>> {
        self.buffer_file(url).boxed()
    }
}
