//! SSD-style face localizer via ONNX Runtime.
//!
//! The network takes a 224×224 BGR mean-subtracted image and emits one row per
//! candidate region: `[class_id, score, x1, y1, x2, y2]` with corners already
//! normalized to the input extent, so no letterbox de-mapping is needed.

use crate::model::{ModelAdapter, ModelError, OnnxModel};
use crate::types::{BoundingBox, DetectedFace, Detection, FaceClass};
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use std::path::Path;

// --- Named constants (no magic numbers) ---
const DETECTOR_INPUT_SIZE: usize = 224;
/// Per-channel means in B, G, R order.
const DETECTOR_MEAN_BGR: [f32; 3] = [104.0, 117.0, 123.0];
const DETECTOR_SCALE: f32 = 0.007843;
const DETECTOR_ROW_LEN: usize = 6;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.7;

/// Capability of finding face regions in an image.
pub trait FaceLocalizer: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Detection, ModelError>;
}

/// Input/output translation for the face detection network.
#[derive(Debug, Clone)]
pub struct DetectorAdapter {
    confidence_threshold: f32,
}

impl DetectorAdapter {
    pub fn new(confidence_threshold: f32) -> Self {
        Self { confidence_threshold }
    }
}

impl Default for DetectorAdapter {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

impl ModelAdapter for DetectorAdapter {
    type Output = Detection;
    const KIND: &'static str = "detector";

    /// Resize to the network input with bilinear filtering, reorder to BGR
    /// planes, subtract the channel means and scale.
    fn preprocess(&self, image: &DynamicImage) -> Array4<f32> {
        let size = DETECTOR_INPUT_SIZE;
        let resized = image
            .resize_exact(size as u32, size as u32, FilterType::Triangle)
            .to_rgb8();

        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b] = pixel.0;
            for (channel, value) in [b, g, r].into_iter().enumerate() {
                tensor[[0, channel, y, x]] =
                    (value as f32 - DETECTOR_MEAN_BGR[channel]) * DETECTOR_SCALE;
            }
        }

        tensor
    }

    fn postprocess(&self, raw: &[f32]) -> Result<Detection, ModelError> {
        if raw.len() % DETECTOR_ROW_LEN != 0 {
            return Err(ModelError::InferenceFailed(format!(
                "detector output length {} is not a multiple of {DETECTOR_ROW_LEN}",
                raw.len()
            )));
        }

        let faces = raw
            .chunks_exact(DETECTOR_ROW_LEN)
            .filter(|row| row[1] >= self.confidence_threshold)
            .map(|row| {
                let (x1, y1, x2, y2) = (row[2], row[3], row[4], row[5]);
                DetectedFace {
                    bbox: BoundingBox::new(x1, y1, x2 - x1, y2 - y1),
                    class: FaceClass::from_class_id(row[0]),
                    confidence: row[1],
                }
            })
            .collect::<Vec<_>>();

        tracing::trace!(candidates = raw.len() / DETECTOR_ROW_LEN, kept = faces.len(), "decoded detections");

        Ok(Detection::from_faces(faces))
    }
}

/// Face localizer backed by an ONNX session.
pub type OnnxFaceLocalizer = OnnxModel<DetectorAdapter>;

impl FaceLocalizer for OnnxFaceLocalizer {
    fn detect(&self, image: &DynamicImage) -> Result<Detection, ModelError> {
        self.predict(image)
    }
}

/// Load the face detection model with the given confidence threshold.
pub fn load_localizer(
    model_path: &Path,
    confidence_threshold: f32,
    intra_threads: usize,
) -> Result<OnnxFaceLocalizer, ModelError> {
    OnnxModel::load(model_path, DetectorAdapter::new(confidence_threshold), intra_threads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn row(class: f32, score: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> [f32; 6] {
        [class, score, x1, y1, x2, y2]
    }

    #[test]
    fn test_preprocess_output_shape() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(64, 48));
        let tensor = DetectorAdapter::default().preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, DETECTOR_INPUT_SIZE, DETECTOR_INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_bgr_mean_subtraction() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([200, 100, 50])));
        let tensor = DetectorAdapter::default().preprocess(&image);
        let b = tensor[[0, 0, 10, 10]];
        let g = tensor[[0, 1, 10, 10]];
        let r = tensor[[0, 2, 10, 10]];
        assert!((b - (50.0 - 104.0) * DETECTOR_SCALE).abs() < 1e-5, "b = {b}");
        assert!((g - (100.0 - 117.0) * DETECTOR_SCALE).abs() < 1e-5, "g = {g}");
        assert!((r - (200.0 - 123.0) * DETECTOR_SCALE).abs() < 1e-5, "r = {r}");
    }

    #[test]
    fn test_postprocess_filters_by_threshold() {
        let mut raw = Vec::new();
        raw.extend(row(1.0, 0.95, 0.1, 0.1, 0.3, 0.4));
        raw.extend(row(1.0, 0.50, 0.5, 0.5, 0.6, 0.6));
        raw.extend(row(1.0, 0.80, 0.6, 0.2, 0.9, 0.5));

        let detection = DetectorAdapter::default().postprocess(&raw).unwrap();
        let Detection::Faces(faces) = detection else {
            panic!("expected faces");
        };
        assert_eq!(faces.len(), 2);
        assert!((faces[0].confidence - 0.95).abs() < 1e-6);
        assert!((faces[1].confidence - 0.80).abs() < 1e-6);
    }

    #[test]
    fn test_postprocess_threshold_inclusive() {
        let raw = row(1.0, 0.7, 0.0, 0.0, 0.5, 0.5);
        let detection = DetectorAdapter::new(0.7).postprocess(&raw).unwrap();
        assert_eq!(detection.len(), 1);
    }

    #[test]
    fn test_postprocess_corners_to_extent() {
        let raw = row(1.0, 0.9, 0.2, 0.1, 0.6, 0.7);
        let Detection::Faces(faces) = DetectorAdapter::default().postprocess(&raw).unwrap() else {
            panic!("expected faces");
        };
        let bbox = faces[0].bbox;
        assert!((bbox.x - 0.2).abs() < 1e-6);
        assert!((bbox.y - 0.1).abs() < 1e-6);
        assert!((bbox.width - 0.4).abs() < 1e-6);
        assert!((bbox.height - 0.6).abs() < 1e-6);
        assert_eq!(faces[0].class, FaceClass::Face);
    }

    #[test]
    fn test_postprocess_nothing_above_threshold() {
        let raw = row(1.0, 0.3, 0.0, 0.0, 0.5, 0.5);
        assert_eq!(DetectorAdapter::default().postprocess(&raw).unwrap(), Detection::NoFace);
        assert_eq!(DetectorAdapter::default().postprocess(&[]).unwrap(), Detection::NoFace);
    }

    #[test]
    fn test_postprocess_rejects_ragged_output() {
        let raw = [1.0, 0.9, 0.0, 0.0, 0.5];
        assert!(matches!(
            DetectorAdapter::default().postprocess(&raw),
            Err(ModelError::InferenceFailed(_))
        ));
    }
}
