use std::fmt;
use std::str::FromStr;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::{OcrError, Result};

/// Region of interest in full-frame pixel coordinates, `[x1, x2) x [y1, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Roi {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// `x2 - x1`, or 0 when the corners are swapped.
    pub fn width(&self) -> u32 {
        (self.x2 as i64 - self.x1 as i64).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y2 as i64 - self.y1 as i64).max(0) as u32
    }

    /// Check `0 <= x1 < x2 <= width` and `0 <= y1 < y2 <= height`.
    pub fn validate(&self, image_width: u32, image_height: u32) -> Result<()> {
        let in_bounds = self.x1 >= 0
            && self.y1 >= 0
            && self.x1 < self.x2
            && self.y1 < self.y2
            && self.x2 as i64 <= image_width as i64
            && self.y2 as i64 <= image_height as i64;

        if !in_bounds {
            return Err(OcrError::InvalidImage(format!(
                "ROI {} outside {}x{} image",
                self, image_width, image_height
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x1, self.y1, self.x2, self.y2)
    }
}

/// Parses `x1,y1,x2,y2`.
impl FromStr for Roi {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<i32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| OcrError::Config(format!("invalid ROI '{}': {}", s, e)))?;

        match parts.as_slice() {
            [x1, y1, x2, y2] => Ok(Roi::new(*x1, *y1, *x2, *y2)),
            _ => Err(OcrError::Config(format!(
                "invalid ROI '{}': expected x1,y1,x2,y2",
                s
            ))),
        }
    }
}

/// Bounding box in the upscaled region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// External border of a connected component found on the eroded image
#[derive(Debug, Clone)]
pub struct Contour {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub point_count: usize,
}

impl Contour {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox {
            x: self.min_x,
            y: self.min_y,
            width: self.width(),
            height: self.height(),
        }
    }

    pub fn center_x(&self) -> f32 {
        self.min_x as f32 + self.width() as f32 / 2.0
    }

    pub fn is_reasonable_size(&self, min_height: u32, min_width: u32) -> bool {
        self.height() >= min_height && self.width() >= min_width
    }
}

/// One digit-sized blob, ready for feature encoding.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub center_x: f32,
    pub bbox: BoundingBox,
    /// Cropped from the thresholded image (before erosion) at `bbox`.
    pub image: GrayImage,
}
