use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::GrayImage;
use tracing::debug;

use crate::error::{OcrError, Result};
use crate::recognition::preprocessing::PreprocessResult;

/// Intermediate images returned alongside a result in debug mode.
#[derive(Debug, Clone)]
pub struct DebugArtifacts {
    pub threshold: GrayImage,
    pub eroded: GrayImage,
    /// Candidates resized to the canonical feature size, left to right
    pub candidates: Vec<GrayImage>,
}

/// Where stage images are written when dumping to disk is enabled.
///
/// Every read gets its own `NNN_<label>` directory, numbered in call order.
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
    reads: Arc<AtomicUsize>,
}

impl DebugConfig {
    /// The directory must be empty or non-existent.
    pub fn new(output_dir: PathBuf) -> Result<Self> {
        if output_dir.exists() {
            let entries = std::fs::read_dir(&output_dir)?;
            if entries.count() > 0 {
                return Err(OcrError::Config(format!(
                    "debug directory is not empty: {}",
                    output_dir.display()
                )));
            }
        } else {
            std::fs::create_dir_all(&output_dir)?;
        }

        Ok(Self {
            output_dir,
            reads: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Save every stage of one read under `<output_dir>/<NNN>_<label>/` and
    /// return that directory.
    pub fn save_read(
        &self,
        label: &str,
        stages: &PreprocessResult,
        canonical: &[GrayImage],
    ) -> Result<PathBuf> {
        let seq = self.reads.fetch_add(1, Ordering::Relaxed) + 1;
        let read_dir = self
            .output_dir
            .join(format!("{:03}_{}", seq, sanitize(label)));
        std::fs::create_dir_all(&read_dir)?;

        stages.cropped.save(read_dir.join("00_roi.png"))?;
        stages.resized.save(read_dir.join("01_resized.png"))?;
        stages.grayscale.save(read_dir.join("02_grayscale.png"))?;
        stages.blurred.save(read_dir.join("03_blur.png"))?;
        stages.thresholded.save(read_dir.join("04_threshold.png"))?;
        stages.eroded.save(read_dir.join("05_erode.png"))?;

        let candidates_dir = read_dir.join("06_candidates");
        save_numbered(&candidates_dir, stages.candidates.iter().map(|c| &c.image))?;
        let canonical_dir = read_dir.join("07_canonical");
        save_numbered(&canonical_dir, canonical.iter())?;

        debug!(
            dir = %read_dir.display(),
            candidates = stages.candidates.len(),
            "saved debug images"
        );
        Ok(read_dir)
    }
}

fn save_numbered<'a>(dir: &Path, images: impl Iterator<Item = &'a GrayImage>) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    for (idx, img) in images.enumerate() {
        img.save(dir.join(format!("{:02}.png", idx + 1)))?;
    }
    Ok(())
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_non_empty_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("stale.png"), b"x").unwrap();
        assert!(DebugConfig::new(dir.path().to_path_buf()).is_err());

        let fresh = dir.path().join("fresh");
        let config = DebugConfig::new(fresh.clone()).unwrap();
        assert!(fresh.is_dir());
        assert_eq!(config.output_dir, fresh);
    }

    #[test]
    fn every_read_gets_its_own_directory() {
        use crate::config::PreprocessParams;
        use crate::models::Roi;
        use crate::recognition::preprocessing::preprocess;
        use image::{DynamicImage, Rgb, RgbImage};

        let frame = DynamicImage::ImageRgb8(RgbImage::from_fn(30, 30, |x, y| {
            if (8..20).contains(&x) && (5..25).contains(&y) {
                Rgb([240, 240, 240])
            } else {
                Rgb([20, 20, 20])
            }
        }));
        let stages = preprocess(&frame, &Roi::new(0, 0, 30, 30), &PreprocessParams::default())
            .unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let config = DebugConfig::new(dir.path().join("out")).unwrap();
        let shared = config.clone();

        let first = config.save_read("shots", &stages, &[]).unwrap();
        let second = shared.save_read("shots", &stages, &[]).unwrap();
        let grouped = config.save_read("home_team/xG", &stages, &[]).unwrap();
        let flat = config.save_read("home_team_xG", &stages, &[]).unwrap();

        let name = |p: &PathBuf| p.file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name(&first), "001_shots");
        assert_eq!(name(&second), "002_shots");
        assert_eq!(name(&grouped), "003_home_team_xG");
        assert_eq!(name(&flat), "004_home_team_xG");
        assert!(first.join("04_threshold.png").is_file());
        assert!(second.join("04_threshold.png").is_file());
    }

    #[test]
    fn labels_become_safe_directory_names() {
        assert_eq!(sanitize("home_team/xG"), "home_team_xG");
        assert_eq!(sanitize("distance covered"), "distance_covered");
    }
}
