use std::time::{Duration, Instant};

use futures_util::future::join_all;
use miette::{miette, Context, IntoDiagnostic, Result};
use preload_shared::manifest::PreloadManifest;
use preload_shared::pipeline::MediaPipeline;
use preload_shared::preloader::PreloadSummary;
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Serialize, Debug)]
pub struct RunReport {
    pub thumbnails_loaded: usize,

    pub thumbnails_failed: usize,

    pub videos: PreloadSummary,

    /// Videos listed in the manifest that did not end up preloaded.
    pub videos_not_preloaded: Vec<String>,

    pub elapsed_seconds: f64,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .into_diagnostic()
            .wrap_err_with(|| miette!("Could not serialize run report."))
    }
}

/// Plays the role of the page bootstrap: queue every thumbnail, submit the video batch after
/// the startup delay, and wait until both queues have drained.
pub async fn run_manifest_to_completion(
    manifest: &PreloadManifest,
    skip_startup_delay: bool,
) -> RunReport {
    let time_run_start = Instant::now();
    let pipeline = MediaPipeline::from_manifest(manifest);

    info!(
        media_root = ?manifest.media_root,
        videos = manifest.videos.len(),
        thumbnails = manifest.thumbnails.len(),
        "Starting preload run."
    );

    let thumbnail_tasks: Vec<_> = manifest
        .thumbnails
        .iter()
        .map(|url| pipeline.thumbnails().load(url.clone()))
        .collect();

    let startup_delay = if skip_startup_delay {
        Duration::ZERO
    } else {
        manifest.startup_delay()
    };
    let warmup = pipeline.schedule_video_warmup(manifest.videos.clone(), startup_delay);

    let mut thumbnails_loaded: usize = 0;
    let mut thumbnails_failed: usize = 0;

    for (url, result) in manifest
        .thumbnails
        .iter()
        .zip(join_all(thumbnail_tasks).await)
    {
        match result {
            Ok(_) => thumbnails_loaded += 1,
            Err(error) => {
                thumbnails_failed += 1;
                warn!(url = url, error = %error, "Thumbnail failed to load.");
            }
        }
    }

    if let Err(error) = warmup.await {
        error!(error = ?error, "Video warm-up task did not complete.");
    }

    pipeline.wait_until_idle().await;

    let videos_not_preloaded: Vec<String> = manifest
        .videos
        .iter()
        .filter(|url| !pipeline.videos().is_preloaded(url))
        .cloned()
        .collect();

    let report = RunReport {
        thumbnails_loaded,
        thumbnails_failed,
        videos: pipeline.videos().summary(),
        videos_not_preloaded,
        elapsed_seconds: time_run_start.elapsed().as_secs_f64(),
    };

    info!(
        thumbnails_loaded = report.thumbnails_loaded,
        thumbnails_failed = report.thumbnails_failed,
        videos_preloaded = report.videos.total_preloaded,
        video_failures = report.videos.total_failures,
        "Finished preload run in {:.3} seconds.",
        report.elapsed_seconds
    );

    report
}
