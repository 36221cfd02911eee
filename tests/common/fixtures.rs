use std::sync::Arc;

use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use statread::recognition::preprocessing;
use statread::{Corpus, DigitRecognizer, KnnModel, PreprocessParams, RecognizerConfig, Roi};

pub const DIGIT_WIDTH: u32 = 14;
pub const DIGIT_HEIGHT: u32 = 24;
pub const STROKE: u32 = 4;
pub const DIGIT_GAP: u32 = 6;
pub const MARGIN: u32 = 6;

pub const BACKGROUND: Rgb<u8> = Rgb([28, 32, 40]);
pub const INK: Rgb<u8> = Rgb([245, 245, 245]);

/// Seven-segment layout per digit: top, upper right, lower right, bottom,
/// lower left, upper left, middle.
const SEGMENTS: [[bool; 7]; 10] = [
    [true, true, true, true, true, true, false],
    [false, true, true, false, false, false, false],
    [true, true, false, true, true, false, true],
    [true, true, true, true, false, false, true],
    [false, true, true, false, false, true, true],
    [true, false, true, true, false, true, true],
    [true, false, true, true, true, true, true],
    [true, true, true, false, false, false, false],
    [true, true, true, true, true, true, true],
    [true, true, true, true, false, true, true],
];

/// Draw one digit glyph with its top-left corner at (x, y).
pub fn draw_digit(img: &mut RgbImage, digit: u8, x: u32, y: u32) {
    let (w, h, s) = (DIGIT_WIDTH, DIGIT_HEIGHT, STROKE);
    let mid = (h - s) / 2;
    let half = mid + s;
    let segments = [
        (0, 0, w, s),
        (w - s, 0, s, half),
        (w - s, mid, s, h - mid),
        (0, h - s, w, s),
        (0, mid, s, h - mid),
        (0, 0, s, half),
        (0, mid, w, s),
    ];

    for (on, (dx, dy, sw, sh)) in SEGMENTS[digit as usize].iter().zip(segments) {
        if *on {
            let rect = Rect::at((x + dx) as i32, (y + dy) as i32).of_size(sw, sh);
            draw_filled_rect_mut(img, rect, INK);
        }
    }
}

/// Draw a digit string left to right and return the ROI around it.
pub fn draw_number(img: &mut RgbImage, text: &str, x: u32, y: u32) -> Roi {
    let mut cursor = x;
    for c in text.chars() {
        let digit = c.to_digit(10).expect("fixture text must be digits") as u8;
        draw_digit(img, digit, cursor, y);
        cursor += DIGIT_WIDTH + DIGIT_GAP;
    }
    let right = cursor - DIGIT_GAP;
    Roi::new(
        (x - MARGIN) as i32,
        (y - MARGIN) as i32,
        (right + MARGIN) as i32,
        (y + DIGIT_HEIGHT + MARGIN) as i32,
    )
}

pub fn blank_frame(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, BACKGROUND)
}

/// A frame with `text` drawn once, and the ROI that covers it.
pub fn screenshot_with(text: &str) -> (DynamicImage, Roi) {
    let width = (80 + text.len() as u32 * (DIGIT_WIDTH + DIGIT_GAP)).max(240);
    let mut frame = blank_frame(width, 90);
    let roi = draw_number(&mut frame, text, 40, 30);
    (DynamicImage::ImageRgb8(frame), roi)
}

/// Segment a single rendered digit the way the recognizer does and return
/// its candidate crop. `shift` moves the glyph inside the frame.
pub fn digit_sample(digit: u8, shift: u32) -> GrayImage {
    let mut frame = blank_frame(80, 60);
    let roi = draw_number(&mut frame, &digit.to_string(), 10 + shift, 12 + shift % 3);
    let stages = preprocessing::preprocess(
        &DynamicImage::ImageRgb8(frame),
        &roi,
        &PreprocessParams::default(),
    )
    .expect("fixture region is valid");
    assert_eq!(
        stages.candidates.len(),
        1,
        "digit {} should segment into one candidate",
        digit
    );
    stages.candidates[0].image.clone()
}

/// Every digit, `per_digit` shifted renderings each.
pub fn digit_corpus(per_digit: u32) -> Corpus {
    let mut corpus = Corpus::new();
    for digit in 0..10u8 {
        for shift in 0..per_digit {
            corpus
                .insert(digit, digit_sample(digit, shift))
                .expect("digit label");
        }
    }
    corpus
}

pub fn trained_model() -> Arc<KnnModel> {
    let config = statread::TrainingConfig::default().with_seed(42);
    let model = statread::training::train(&digit_corpus(5), &config).expect("training succeeds");
    Arc::new(model)
}

pub fn recognizer() -> DigitRecognizer {
    DigitRecognizer::new(trained_model(), RecognizerConfig::default())
        .expect("model matches default config")
}
