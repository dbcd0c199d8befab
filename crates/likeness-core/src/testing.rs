//! Deterministic stand-ins for the ONNX models, used by unit tests.

use crate::detector::FaceLocalizer;
use crate::encoder::FaceEncoder;
use crate::model::ModelError;
use crate::types::{BoundingBox, DetectedFace, Detection, Embedding, FaceClass};
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Pixel (0, 0) colour that makes [`FakeLocalizer`] report no face.
pub const NO_FACE_MARKER: Rgb<u8> = Rgb([0, 0, 0]);
/// Pixel (0, 0) colour that makes [`FakeLocalizer`] fail.
pub const FAILURE_MARKER: Rgb<u8> = Rgb([255, 0, 255]);

pub fn face(x: f32, y: f32, w: f32, h: f32) -> DetectedFace {
    DetectedFace {
        bbox: BoundingBox::new(x, y, w, h),
        class: FaceClass::Face,
        confidence: 0.9,
    }
}

/// Write a solid-colour PNG.
pub fn write_image(path: &Path, width: u32, height: u32, colour: Rgb<u8>) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    RgbImage::from_pixel(width, height, colour).save(path).unwrap();
}

/// Returns the same faces for every image, keyed off pixel (0, 0) markers.
pub struct FakeLocalizer {
    pub faces: Vec<DetectedFace>,
}

impl FakeLocalizer {
    pub fn single() -> Self {
        Self { faces: vec![face(0.25, 0.25, 0.5, 0.5)] }
    }
}

impl FaceLocalizer for FakeLocalizer {
    fn detect(&self, image: &DynamicImage) -> Result<Detection, ModelError> {
        let marker = image.to_rgb8().get_pixel(0, 0).to_owned();
        if marker == FAILURE_MARKER {
            return Err(ModelError::InferenceFailed("fake detector failure".into()));
        }
        if marker == NO_FACE_MARKER {
            return Ok(Detection::NoFace);
        }
        Ok(Detection::from_faces(self.faces.clone()))
    }
}

/// Embeds a crop as `[mean r, mean g, mean b, width, height]`.
#[derive(Default)]
pub struct FakeEncoder {
    /// Fail on crops taller than they are wide.
    pub fail_on_portrait: bool,
    pub calls: AtomicUsize,
}

impl FakeEncoder {
    pub fn failing_on_portrait() -> Self {
        Self { fail_on_portrait: true, ..Self::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FaceEncoder for FakeEncoder {
    fn embed(&self, face: &DynamicImage) -> Result<Embedding, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (width, height) = face.dimensions();
        if self.fail_on_portrait && height > width {
            return Err(ModelError::InferenceFailed("fake encoder failure".into()));
        }

        let rgb = face.to_rgb8();
        let count = f64::from(width * height);
        let mut sums = [0.0f64; 3];
        for pixel in rgb.pixels() {
            for (sum, &value) in sums.iter_mut().zip(pixel.0.iter()) {
                *sum += f64::from(value);
            }
        }

        Ok(Embedding::new(vec![
            sums[0] / count,
            sums[1] / count,
            sums[2] / count,
            f64::from(width),
            f64::from(height),
        ]))
    }
}
