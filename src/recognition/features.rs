use image::GrayImage;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

/// Canonical glyph size every candidate is normalized to before classification.
///
/// Training and inference must agree on this value; the model artifact stores
/// it so a mismatched pairing is rejected at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSize {
    pub width: u32,
    pub height: u32,
}

impl FeatureSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Length of the flattened feature vector
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FeatureSize {
    fn default() -> Self {
        Self::new(30, 35)
    }
}

impl std::fmt::Display for FeatureSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Resize to the canonical size, ignoring aspect ratio.
pub fn resize_to_canonical(img: &GrayImage, size: FeatureSize) -> GrayImage {
    imageops::resize(img, size.width, size.height, FilterType::CatmullRom)
}

/// Flatten a glyph into a row-major feature vector with values in `[0, 255]`.
pub fn encode(img: &GrayImage, size: FeatureSize) -> Vec<f32> {
    flatten(&resize_to_canonical(img, size))
}

pub fn flatten(img: &GrayImage) -> Vec<f32> {
    img.as_raw().iter().map(|&v| v as f32).collect()
}
