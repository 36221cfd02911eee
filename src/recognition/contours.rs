use image::GrayImage;
use image::imageops;
use imageproc::contours::BorderType;

use crate::models::{Candidate, Contour};

/// Find the external borders of the foreground (non-zero) blobs.
///
/// Holes and anything nested inside a hole are ignored, so the ring of a
/// "0" or "8" yields exactly one contour.
pub fn find_contours(binary: &GrayImage) -> Vec<Contour> {
    imageproc::contours::find_contours::<u32>(binary)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .filter_map(|c| {
            let first = c.points.first()?;
            let init = (first.x, first.y, first.x, first.y);
            let (min_x, min_y, max_x, max_y) =
                c.points.iter().fold(init, |(min_x, min_y, max_x, max_y), p| {
                    (min_x.min(p.x), min_y.min(p.y), max_x.max(p.x), max_y.max(p.y))
                });
            Some(Contour {
                min_x,
                min_y,
                max_x,
                max_y,
                point_count: c.points.len(),
            })
        })
        .collect()
}

/// Drop contours below the minimum glyph size and order the survivors left to
/// right by horizontal center.
///
/// Each candidate's image is cropped from `source` (the pre-erosion mask) at
/// the contour's bounding box.
pub fn filter_and_order(
    contours: &[Contour],
    source: &GrayImage,
    min_height: u32,
    min_width: u32,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = contours
        .iter()
        .filter(|c| c.is_reasonable_size(min_height, min_width))
        .map(|c| {
            let bbox = c.bounding_box();
            let image = imageops::crop_imm(source, bbox.x, bbox.y, bbox.width, bbox.height)
                .to_image();
            Candidate {
                center_x: c.center_x(),
                bbox,
                image,
            }
        })
        .collect();

    // Stable: equal centers keep discovery order.
    candidates.sort_by(|a, b| a.center_x.total_cmp(&b.center_x));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn fill(img: &mut GrayImage, x0: u32, y0: u32, w: u32, h: u32) {
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                img.put_pixel(x, y, Luma([255]));
            }
        }
    }

    #[test]
    fn ring_yields_single_external_contour() {
        let mut img = GrayImage::new(40, 40);
        fill(&mut img, 5, 5, 20, 30);
        // Punch a hole and put a speck inside it
        for y in 10..30 {
            for x in 10..20 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        fill(&mut img, 14, 18, 2, 2);

        let contours = find_contours(&img);
        assert_eq!(contours.len(), 1);
        let bbox = contours[0].bounding_box();
        assert_eq!((bbox.x, bbox.y, bbox.width, bbox.height), (5, 5, 20, 30));
    }

    #[test]
    fn filters_small_blobs_and_orders_by_center() {
        let mut img = GrayImage::new(120, 40);
        fill(&mut img, 80, 5, 10, 25); // right digit
        fill(&mut img, 10, 5, 12, 25); // left digit
        fill(&mut img, 54, 5, 3, 3); // speck
        fill(&mut img, 40, 5, 10, 10); // too short
        fill(&mut img, 60, 5, 4, 25); // too narrow

        let contours = find_contours(&img);
        assert_eq!(contours.len(), 5);

        let candidates = filter_and_order(&contours, &img, 18, 8);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].bbox.x, 10);
        assert_eq!(candidates[1].bbox.x, 80);
        assert_eq!(candidates[0].center_x, 16.0);
        assert_eq!(candidates[0].image.dimensions(), (12, 25));
        assert!(
            candidates
                .windows(2)
                .all(|w| w[0].center_x <= w[1].center_x)
        );
    }

    #[test]
    fn empty_mask_has_no_candidates() {
        let img = GrayImage::new(30, 30);
        let contours = find_contours(&img);
        assert!(contours.is_empty());
        assert!(filter_and_order(&contours, &img, 18, 8).is_empty());
    }
}
