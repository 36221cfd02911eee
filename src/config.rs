//! Tunable parameters and caller-owned configuration.
//!
//! Nothing here is process-global: every value is threaded through the call
//! that uses it so tests can vary them independently.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OcrError, Result};
use crate::models::Roi;
use crate::recognition::features::FeatureSize;

/// Largest accepted upscale factor.
pub const MAX_SCALE: u32 = 16;

/// Parameters of the region preprocessor and candidate filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessParams {
    /// Integer upscale factor applied to the cropped region, at most [`MAX_SCALE`]
    pub scale: u32,
    /// Nominal Gaussian kernel size (odd). Only the sigma is derived from it;
    /// the blur picks its own support from that sigma.
    pub blur_kernel: u32,
    /// Square structuring element size for erosion (odd)
    pub erode_kernel: u32,
    pub erode_iterations: u32,
    pub min_height: u32,
    pub min_width: u32,
}

impl Default for PreprocessParams {
    fn default() -> Self {
        Self {
            scale: 4,
            blur_kernel: 5,
            erode_kernel: 3,
            erode_iterations: 2,
            min_height: 18,
            min_width: 8,
        }
    }
}

impl PreprocessParams {
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_erode_iterations(mut self, iterations: u32) -> Self {
        self.erode_iterations = iterations;
        self
    }

    pub fn with_min_size(mut self, min_height: u32, min_width: u32) -> Self {
        self.min_height = min_height;
        self.min_width = min_width;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.scale == 0 || self.scale > MAX_SCALE {
            return Err(OcrError::Config(format!(
                "scale must be between 1 and {}, got {}",
                MAX_SCALE, self.scale
            )));
        }
        if self.blur_kernel == 0 || self.blur_kernel % 2 == 0 {
            return Err(OcrError::Config(format!(
                "blur kernel must be odd, got {}",
                self.blur_kernel
            )));
        }
        if self.erode_kernel == 0 || self.erode_kernel % 2 == 0 || self.erode_kernel > 511 {
            return Err(OcrError::Config(format!(
                "erode kernel must be odd and at most 511, got {}",
                self.erode_kernel
            )));
        }
        Ok(())
    }
}

/// Statistic identifiers whose last digit is read as the tenths place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecimalAllowList(BTreeSet<String>);

impl DecimalAllowList {
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    pub fn contains(&self, stat: &str) -> bool {
        self.0.contains(stat)
    }

    pub fn insert(&mut self, stat: impl Into<String>) -> bool {
        self.0.insert(stat.into())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Default for DecimalAllowList {
    fn default() -> Self {
        ["xG", "distance_covered", "distance_sprinted"]
            .into_iter()
            .collect()
    }
}

impl<S: Into<String>> FromIterator<S> for DecimalAllowList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Everything the online recognizer needs besides the model and the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub preprocess: PreprocessParams,
    pub feature_size: FeatureSize,
    pub decimal_stats: DecimalAllowList,
    /// Per-screen preprocessing replacing `preprocess` for that screen
    pub screen_overrides: BTreeMap<String, PreprocessParams>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        let mut screen_overrides = BTreeMap::new();
        // Attribute screens use coloured text that thins out quickly under erosion.
        screen_overrides.insert(
            "player_attributes".to_string(),
            PreprocessParams::default().with_erode_iterations(1),
        );

        Self {
            preprocess: PreprocessParams::default(),
            feature_size: FeatureSize::default(),
            decimal_stats: DecimalAllowList::default(),
            screen_overrides,
        }
    }
}

impl RecognizerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_preprocess(mut self, params: PreprocessParams) -> Self {
        self.preprocess = params;
        self
    }

    pub fn with_feature_size(mut self, size: FeatureSize) -> Self {
        self.feature_size = size;
        self
    }

    pub fn with_decimal_stats(mut self, stats: DecimalAllowList) -> Self {
        self.decimal_stats = stats;
        self
    }

    /// Preprocessing parameters to use for stats on `screen`.
    pub fn params_for(&self, screen: &str) -> &PreprocessParams {
        self.screen_overrides.get(screen).unwrap_or(&self.preprocess)
    }

    pub fn validate(&self) -> Result<()> {
        self.preprocess.validate()?;
        for params in self.screen_overrides.values() {
            params.validate()?;
        }
        if self.feature_size.is_empty() {
            return Err(OcrError::Config("feature size must be non-zero".into()));
        }
        Ok(())
    }
}

/// A layout entry: either a stat rectangle or a named group of them
/// (e.g. home/away team columns on the match overview).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoiEntry {
    Rect(Roi),
    Group(BTreeMap<String, Roi>),
}

/// Screen name -> stat name -> rectangle, as captured for a given resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScreenLayout(BTreeMap<String, BTreeMap<String, RoiEntry>>);

impl ScreenLayout {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn screen(&self, name: &str) -> Option<&BTreeMap<String, RoiEntry>> {
        self.0.get(name)
    }

    pub fn screens(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn insert(&mut self, screen: impl Into<String>, stat: impl Into<String>, entry: RoiEntry) {
        self.0
            .entry(screen.into())
            .or_default()
            .insert(stat.into(), entry);
    }
}
