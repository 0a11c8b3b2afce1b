use std::path::PathBuf;
use std::sync::Arc;

use image::{GenericImageView, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ThumbnailError;
use crate::media::resolve_media_path;
use crate::queue::{QueuedTask, SequentialTaskQueue};

#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Debug)]
pub struct Thumbnail {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Loads thumbnail images through a [`SequentialTaskQueue`], so only one image is
/// being read and decoded at any given time.
#[derive(Clone)]
pub struct ThumbnailLoader {
    queue: SequentialTaskQueue,

    media_root: Arc<PathBuf>,
}

impl ThumbnailLoader {
    pub fn new(queue: SequentialTaskQueue, media_root: PathBuf) -> Self {
        Self {
            queue,
            media_root: Arc::new(media_root),
        }
    }

    pub fn queue(&self) -> &SequentialTaskQueue {
        &self.queue
    }

    pub fn load<S: Into<String>>(&self, url: S) -> QueuedTask<Thumbnail, ThumbnailError> {
        let url = url.into();
        let media_root = self.media_root.clone();

        self.queue.add(move || async move {
            let path = resolve_media_path(&media_root, &url)?;

            let (width, height) = tokio::task::spawn_blocking(move || decode_dimensions(path))
                .await??;

            debug!(url = url, width = width, height = height, "Loaded thumbnail.");

            Ok::<_, ThumbnailError>(Thumbnail { url, width, height })
        })
    }
}

fn decode_dimensions(path: PathBuf) -> Result<(u32, u32), ThumbnailError> {
    let decoded = ImageReader::open(&path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(image::ImageError::IoError)
        .and_then(|reader| reader.decode())
        .map_err(|source| ThumbnailError::Decode { path, source })?;

    Ok(decoded.dimensions())
}
