pub mod assemble;
pub mod contours;
pub mod debug_dump;
pub mod features;
pub mod preprocessing;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use image::DynamicImage;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classifier::KnnModel;
use crate::config::{PreprocessParams, RecognizerConfig, RoiEntry, ScreenLayout};
use crate::error::{OcrError, Result};
use crate::models::Roi;

pub use assemble::StatValue;
pub use debug_dump::{DebugArtifacts, DebugConfig};
pub use features::FeatureSize;
pub use preprocessing::PreprocessResult;

/// Outcome of one successful recognition call.
///
/// `value` is only `None` in debug mode when no digit candidates were found;
/// `debug` is only populated in debug mode.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub value: Option<StatValue>,
    pub debug: Option<DebugArtifacts>,
}

/// Per-stat outcome of reading a whole screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatReading {
    Value(StatValue),
    /// Debug mode found no candidates
    Missing,
    Failed { error: String },
    Group(BTreeMap<String, StatReading>),
}

/// Reads on-screen statistics from screenshots with a shared, read-only model.
pub struct DigitRecognizer {
    model: Arc<KnnModel>,
    config: RecognizerConfig,
    debug_artifacts: bool,
    debug_dump: Option<DebugConfig>,
}

impl DigitRecognizer {
    /// Pair a loaded model with a configuration. Fails if the model was
    /// encoded at a different canonical size than the configuration uses.
    pub fn new(model: Arc<KnnModel>, config: RecognizerConfig) -> Result<Self> {
        config.validate()?;
        if model.feature_size() != config.feature_size {
            return Err(OcrError::Config(format!(
                "model feature size {} does not match configured {}",
                model.feature_size(),
                config.feature_size
            )));
        }

        Ok(Self {
            model,
            config,
            debug_artifacts: false,
            debug_dump: None,
        })
    }

    /// Load the model at `model_path` for the configured feature size.
    pub fn from_model_file(
        model_path: impl AsRef<std::path::Path>,
        config: RecognizerConfig,
    ) -> Result<Self> {
        let model = KnnModel::load(model_path, config.feature_size)?;
        Self::new(Arc::new(model), config)
    }

    /// Return intermediate images with every result, and report an empty
    /// region as `value: None` instead of `NoDigitsFound`.
    pub fn with_debug_artifacts(mut self, enabled: bool) -> Self {
        self.debug_artifacts = enabled;
        self
    }

    /// Also write stage images below `output_dir`, which must be empty or non-existent.
    /// A failed write is logged and does not fail the read.
    pub fn with_debug_dump(mut self, output_dir: PathBuf) -> Result<Self> {
        self.debug_dump = Some(DebugConfig::new(output_dir)?);
        Ok(self)
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    pub fn model(&self) -> &KnnModel {
        &self.model
    }

    /// Read one statistic with the default preprocessing parameters.
    pub fn recognize(&self, screenshot: &DynamicImage, roi: Roi, stat: &str) -> Result<Recognition> {
        self.recognize_with(screenshot, roi, stat, &self.config.preprocess)
    }

    /// Read one statistic with explicit preprocessing parameters.
    pub fn recognize_with(
        &self,
        screenshot: &DynamicImage,
        roi: Roi,
        stat: &str,
        params: &PreprocessParams,
    ) -> Result<Recognition> {
        self.run(screenshot, roi, stat, stat, params)
    }

    fn run(
        &self,
        screenshot: &DynamicImage,
        roi: Roi,
        stat: &str,
        label: &str,
        params: &PreprocessParams,
    ) -> Result<Recognition> {
        let stages = preprocessing::preprocess(screenshot, &roi, params)?;

        let canonical: Vec<_> = stages
            .candidates
            .iter()
            .map(|c| features::resize_to_canonical(&c.image, self.config.feature_size))
            .collect();

        if let Some(dump) = &self.debug_dump {
            if let Err(e) = dump.save_read(label, &stages, &canonical) {
                warn!(stat = label, error = %e, "failed to write debug images");
            }
        }

        let artifacts = self.debug_artifacts.then(|| DebugArtifacts {
            threshold: stages.thresholded.clone(),
            eroded: stages.eroded.clone(),
            candidates: canonical.clone(),
        });

        if canonical.is_empty() {
            if self.debug_artifacts {
                debug!(stat, roi = %roi, "no digit candidates");
                return Ok(Recognition {
                    value: None,
                    debug: artifacts,
                });
            }
            return Err(OcrError::NoDigitsFound {
                stat: stat.to_string(),
            });
        }

        let digits = canonical
            .iter()
            .enumerate()
            .map(|(idx, glyph)| {
                self.model
                    .predict(&features::flatten(glyph))
                    .map_err(|e| match e {
                        OcrError::Classification(reason) => OcrError::Classification(format!(
                            "stat '{}' candidate {}: {}",
                            stat,
                            idx + 1,
                            reason
                        )),
                        other => other,
                    })
            })
            .collect::<Result<Vec<u8>>>()?;

        let value = assemble::assemble(&digits, stat, &self.config.decimal_stats)?;
        debug!(stat, roi = %roi, ?digits, %value, "recognized");

        Ok(Recognition {
            value: Some(value),
            debug: artifacts,
        })
    }

    /// Read every statistic a layout defines for `screen`.
    ///
    /// Failures are recorded per stat; the caller decides on fallbacks.
    pub fn read_screen(
        &self,
        screenshot: &DynamicImage,
        layout: &ScreenLayout,
        screen: &str,
    ) -> Result<BTreeMap<String, StatReading>> {
        let entries = layout
            .screen(screen)
            .ok_or_else(|| OcrError::Config(format!("layout has no screen '{}'", screen)))?;
        let params = self.config.params_for(screen);
        info!(screen, stats = entries.len(), "reading screen");

        let mut readings = BTreeMap::new();
        for (name, entry) in entries {
            let reading = match entry {
                RoiEntry::Rect(roi) => self.read_one(screenshot, *roi, name, name, params),
                RoiEntry::Group(group) => StatReading::Group(
                    group
                        .iter()
                        .map(|(stat, roi)| {
                            let label = format!("{}/{}", name, stat);
                            (stat.clone(), self.read_one(screenshot, *roi, stat, &label, params))
                        })
                        .collect(),
                ),
            };
            readings.insert(name.clone(), reading);
        }
        Ok(readings)
    }

    fn read_one(
        &self,
        screenshot: &DynamicImage,
        roi: Roi,
        stat: &str,
        label: &str,
        params: &PreprocessParams,
    ) -> StatReading {
        match self.run(screenshot, roi, stat, label, params) {
            Ok(Recognition { value: Some(v), .. }) => StatReading::Value(v),
            Ok(Recognition { value: None, .. }) => StatReading::Missing,
            Err(e) => {
                warn!(stat = label, roi = %roi, error = %e, "failed to read stat");
                StatReading::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}
