use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology;
use tracing::debug;

use crate::config::PreprocessParams;
use crate::error::{OcrError, Result};
use crate::models::{Candidate, Contour, Roi};
use crate::recognition::contours;

/// Every intermediate image of one preprocessing call plus the ordered candidates.
#[derive(Debug, Clone)]
pub struct PreprocessResult {
    /// The ROI as cropped from the frame
    pub cropped: DynamicImage,
    pub resized: DynamicImage,
    pub grayscale: GrayImage,
    pub blurred: GrayImage,
    pub thresholded: GrayImage,
    pub eroded: GrayImage,
    /// Otsu level chosen for `thresholded`
    pub threshold_level: u8,
    /// External contours of the eroded image, before size filtering
    pub contours: Vec<Contour>,
    /// Size-filtered candidates, left to right
    pub candidates: Vec<Candidate>,
}

/// Crop the region of interest out of the full frame
pub fn crop_roi(img: &DynamicImage, roi: &Roi) -> Result<DynamicImage> {
    if img.width() == 0 || img.height() == 0 {
        return Err(OcrError::InvalidImage("input bitmap is empty".into()));
    }
    roi.validate(img.width(), img.height())?;

    let cropped = img.crop_imm(roi.x1 as u32, roi.y1 as u32, roi.width(), roi.height());
    if cropped.width() == 0 || cropped.height() == 0 {
        return Err(OcrError::InvalidImage(format!("ROI {} produced an empty crop", roi)));
    }
    Ok(cropped)
}

/// Largest upscaled region, in pixels.
pub const MAX_UPSCALED_PIXELS: u64 = 1 << 26;

/// Upscale by an integer factor with cubic interpolation
pub fn upscale(img: &DynamicImage, scale: u32) -> Result<DynamicImage> {
    let width = img.width() as u64 * scale as u64;
    let height = img.height() as u64 * scale as u64;
    if width * height > MAX_UPSCALED_PIXELS {
        return Err(OcrError::InvalidImage(format!(
            "{}x{} region upscaled by {} exceeds {} pixels",
            img.width(),
            img.height(),
            scale,
            MAX_UPSCALED_PIXELS
        )));
    }
    Ok(img.resize_exact(width as u32, height as u32, FilterType::CatmullRom))
}

/// Convert image to grayscale
pub fn to_grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Sigma OpenCV derives for a Gaussian kernel of size `kernel` when none is given.
pub fn kernel_sigma(kernel: u32) -> f32 {
    0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, kernel: u32) -> GrayImage {
    gaussian_blur_f32(img, kernel_sigma(kernel))
}

/// Binarize with Otsu's global threshold. Returns the image and the chosen level.
pub fn binarize(img: &GrayImage) -> (GrayImage, u8) {
    let level = otsu_level(img);
    (threshold(img, level, ThresholdType::Binary), level)
}

/// Erode foreground blobs with a square structuring element, `iterations` times.
pub fn erode(img: &GrayImage, kernel: u32, iterations: u32) -> GrayImage {
    let radius = (kernel / 2) as u8;
    let mut eroded = img.clone();
    for _ in 0..iterations {
        eroded = morphology::erode(&eroded, Norm::LInf, radius);
    }
    eroded
}

/// Run the full region pipeline: crop, upscale, grayscale, blur, threshold,
/// erode, then segment the eroded image into ordered digit candidates.
///
/// Candidates are cropped from the thresholded image; erosion only serves
/// segmentation. Zero candidates is a valid outcome here.
pub fn preprocess(
    screenshot: &DynamicImage,
    roi: &Roi,
    params: &PreprocessParams,
) -> Result<PreprocessResult> {
    params.validate()?;

    let cropped = crop_roi(screenshot, roi)?;
    let resized = upscale(&cropped, params.scale)?;
    let grayscale = to_grayscale(&resized);
    let blurred = apply_blur(&grayscale, params.blur_kernel);
    let (thresholded, threshold_level) = binarize(&blurred);
    let eroded = erode(&thresholded, params.erode_kernel, params.erode_iterations);

    let found = contours::find_contours(&eroded);
    let candidates =
        contours::filter_and_order(&found, &thresholded, params.min_height, params.min_width);

    debug!(
        roi = %roi,
        width = resized.width(),
        height = resized.height(),
        threshold_level,
        contours = found.len(),
        candidates = candidates.len(),
        "preprocessed region"
    );

    Ok(PreprocessResult {
        cropped,
        resized,
        grayscale,
        blurred,
        thresholded,
        eroded,
        threshold_level,
        contours: found,
        candidates,
    })
}
