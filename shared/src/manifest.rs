use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::{miette, Context, IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};

use crate::media::DEFAULT_MIN_BUFFERED_BYTES;

fn default_startup_delay_ms() -> u64 {
    1000
}

fn default_inter_item_delay_ms() -> u64 {
    100
}

fn default_min_buffered_bytes() -> u64 {
    DEFAULT_MIN_BUFFERED_BYTES
}

fn default_require_known_container() -> bool {
    true
}

/// Describes which media a site wants warmed up, and how.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PreloadManifest {
    /// Directory the site-relative media URLs are resolved against.
    /// Relative paths are relative to the manifest file.
    pub media_root: PathBuf,

    /// Delay before the video batch is submitted, so it doesn't compete with first paint.
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,

    /// Pause between two consecutive video preloads.
    #[serde(default = "default_inter_item_delay_ms")]
    pub inter_item_delay_ms: u64,

    /// How much of a video must be buffered before it counts as preloaded.
    #[serde(default = "default_min_buffered_bytes")]
    pub min_buffered_bytes: u64,

    #[serde(default = "default_require_known_container")]
    pub require_known_container: bool,

    #[serde(default)]
    pub videos: Vec<String>,

    #[serde(default)]
    pub thumbnails: Vec<String>,
}

impl PreloadManifest {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() && !path.is_file() {
            return Err(miette!("Path exists, but it is not a file!"));
        } else if !path.exists() {
            return Err(miette!("No such file: {:?}", path));
        }

        let file_contents = read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| miette!("Could not read preload manifest from file."))?;

        let mut manifest = Self::from_toml_str(&file_contents)?;

        if manifest.media_root.is_relative() {
            let manifest_directory = path.parent().unwrap_or_else(|| Path::new("."));
            manifest.media_root = manifest_directory.join(&manifest.media_root);
        }

        Ok(manifest)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(contents)
            .into_diagnostic()
            .wrap_err_with(|| miette!("Could not parse TOML contents of preload manifest."))?;

        manifest.validate()?;

        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        if self.min_buffered_bytes == 0 {
            return Err(miette!("min_buffered_bytes must be greater than zero."));
        }

        Ok(())
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }
}


#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let manifest = PreloadManifest::from_toml_str(r#"media_root = "/srv/public""#).unwrap();

        assert_eq!(manifest.startup_delay(), Duration::from_secs(1));
        assert_eq!(manifest.inter_item_delay(), Duration::from_millis(100));
        assert_eq!(manifest.min_buffered_bytes, DEFAULT_MIN_BUFFERED_BYTES);
        assert!(manifest.require_known_container);
        assert!(manifest.videos.is_empty());
        assert!(manifest.thumbnails.is_empty());
    }

    #[test]
    fn rejects_zero_buffer_threshold_and_malformed_toml() {
        assert!(PreloadManifest::from_toml_str(
            "media_root = \"public\"\nmin_buffered_bytes = 0"
        )
        .is_err());
        assert!(PreloadManifest::from_toml_str("videos = [").is_err());
        assert!(PreloadManifest::from_toml_str("videos = []").is_err());
    }

    #[test]
    fn relative_media_root_is_resolved_next_to_the_manifest() {
        let directory = TempDir::new().unwrap();
        let manifest_path = directory.path().join("site.toml");
        fs::write(
            &manifest_path,
            "media_root = \"public\"\nvideos = [\"/videos/a.mp4\"]\nthumbnails = [\"/thumbnails/1.jpg\"]\n",
        )
        .unwrap();

        let manifest = PreloadManifest::load_from_file(&manifest_path).unwrap();

        assert_eq!(manifest.media_root, directory.path().join("public"));
        assert_eq!(manifest.videos, vec!["/videos/a.mp4"]);
        assert_eq!(manifest.thumbnails, vec!["/thumbnails/1.jpg"]);
    }

    #[test]
    fn refuses_directories_and_missing_files() {
        let directory = TempDir::new().unwrap();

        assert!(PreloadManifest::load_from_file(directory.path()).is_err());
        assert!(PreloadManifest::load_from_file(directory.path().join("nope.toml")).is_err());
    }
}
