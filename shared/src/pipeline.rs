use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::manifest::PreloadManifest;
use crate::media::{FsMediaLoader, MediaLoader};
use crate::preloader::VideoPreloader;
use crate::queue::SequentialTaskQueue;
use crate::thumbnails::ThumbnailLoader;

/// Owns the one thumbnail queue and the one video preloader of a site.
///
/// Components receive clones of the handles instead of reaching for globals.
#[derive(Clone)]
pub struct MediaPipeline {
    videos: VideoPreloader,

    thumbnails: ThumbnailLoader,

    /// Number of warm-up batches still waiting out their startup delay.
    scheduled_warmups_tx: Arc<watch::Sender<usize>>,
}

/// Decrements the scheduled warm-up count when the warm-up task ends, even if it is aborted.
struct ScheduledWarmupGuard(Arc<watch::Sender<usize>>);

impl Drop for ScheduledWarmupGuard {
    fn drop(&mut self) {
        self.0.send_modify(|scheduled| *scheduled = scheduled.saturating_sub(1));
    }
}

impl MediaPipeline {
    pub fn new(videos: VideoPreloader, thumbnails: ThumbnailLoader) -> Self {
        let (scheduled_warmups_tx, _) = watch::channel(0);

        Self {
            videos,
            thumbnails,
            scheduled_warmups_tx: Arc::new(scheduled_warmups_tx),
        }
    }

    pub fn from_manifest(manifest: &PreloadManifest) -> Self {
        let video_loader: Arc<dyn MediaLoader> = Arc::new(
            FsMediaLoader::new(manifest.media_root.clone())
                .with_min_buffered_bytes(manifest.min_buffered_bytes)
                .with_container_check(manifest.require_known_container),
        );

        Self::new(
            VideoPreloader::new(video_loader, manifest.inter_item_delay()),
            ThumbnailLoader::new(
                SequentialTaskQueue::new("thumbnails"),
                manifest.media_root.clone(),
            ),
        )
    }

    pub fn videos(&self) -> &VideoPreloader {
        &self.videos
    }

    pub fn thumbnails(&self) -> &ThumbnailLoader {
        &self.thumbnails
    }

    /// Submit `urls` to the video preloader once `startup_delay` has passed.
    /// The handle resolves to the number of URLs that were actually queued.
    pub fn schedule_video_warmup(
        &self,
        urls: Vec<String>,
        startup_delay: Duration,
    ) -> JoinHandle<usize> {
        let videos = self.videos.clone();

        self.scheduled_warmups_tx
            .send_modify(|scheduled| *scheduled += 1);
        let guard = ScheduledWarmupGuard(self.scheduled_warmups_tx.clone());

        tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(startup_delay).await;

            info!(
                batch_size = urls.len(),
                "Submitting video warm-up batch."
            );

            videos.add_to_queue(urls)
        })
    }

    /// Resolves once every scheduled warm-up batch has been submitted and both queues have
    /// drained.
    pub async fn wait_until_idle(&self) {
        let mut scheduled_warmups_rx = self.scheduled_warmups_tx.subscribe();
        let _ = scheduled_warmups_rx
            .wait_for(|scheduled| *scheduled == 0)
            .await;

        self.thumbnails.queue().wait_until_idle().await;
        self.videos.wait_until_idle().await;
    }
}


#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn warmup_waits_for_the_startup_delay() {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("videos")).unwrap();
        fs::write(root.path().join("videos/a.mp4"), b"\x00\x00\x00\x18ftypmp42").unwrap();

        let manifest = PreloadManifest::from_toml_str(&format!(
            "media_root = {:?}\nstartup_delay_ms = 500\n",
            root.path().to_string_lossy()
        ))
        .unwrap();
        let pipeline = MediaPipeline::from_manifest(&manifest);

        let warmup = pipeline.schedule_video_warmup(
            vec!["/videos/a.mp4".to_string(), "/videos/a.mp4".to_string()],
            manifest.startup_delay(),
        );

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!pipeline.videos().is_preloading());
        assert_eq!(pipeline.videos().summary().total_queued, 0);

        assert_eq!(warmup.await.unwrap(), 1);
        pipeline.wait_until_idle().await;

        assert!(pipeline.videos().is_preloaded("/videos/a.mp4"));
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_for_idle_covers_warmups_still_in_their_startup_delay() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("b.mp4"), b"\x00\x00\x00\x18ftypmp42").unwrap();

        let manifest = PreloadManifest::from_toml_str(&format!(
            "media_root = {:?}\n",
            root.path().to_string_lossy()
        ))
        .unwrap();
        let pipeline = MediaPipeline::from_manifest(&manifest);

        let _warmup = pipeline.schedule_video_warmup(
            vec!["/b.mp4".to_string()],
            Duration::from_secs(2),
        );

        pipeline.wait_until_idle().await;

        assert!(pipeline.videos().is_preloaded("/b.mp4"));
    }
}
