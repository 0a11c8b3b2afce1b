use std::path::PathBuf;

use miette::{miette, Result};
use preload_shared::manifest::PreloadManifest;
use preload_shared::media::resolve_media_path;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct CheckReport {
    pub found: Vec<PathBuf>,

    /// `(url, reason)` pairs for media that could not be resolved to an existing file.
    pub problems: Vec<(String, String)>,
}

impl CheckReport {
    pub fn log(&self) {
        for (url, reason) in &self.problems {
            warn!(url = url, reason = reason, "Listed media is not usable.");
        }

        info!(
            found = self.found.len(),
            problems = self.problems.len(),
            "Checked preload manifest."
        );
    }

    pub fn into_result(self) -> Result<()> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(miette!(
                "{} of the listed media files are missing or invalid.",
                self.problems.len()
            ))
        }
    }
}

pub fn check_manifest(manifest: &PreloadManifest) -> CheckReport {
    let mut report = CheckReport::default();

    if !manifest.media_root.is_dir() {
        report.problems.push((
            manifest.media_root.to_string_lossy().to_string(),
            "media root is not a directory".to_string(),
        ));
        return report;
    }

    for url in manifest.videos.iter().chain(manifest.thumbnails.iter()) {
        match resolve_media_path(&manifest.media_root, url) {
            Ok(path) if path.is_file() => report.found.push(path),
            Ok(path) => report
                .problems
                .push((url.clone(), format!("no such file: {:?}", path))),
            Err(error) => report.problems.push((url.clone(), error.to_string())),
        }
    }

    report
}
