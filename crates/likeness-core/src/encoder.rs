//! VGGFace2 face encoder via ONNX Runtime.
//!
//! Maps a cropped face to a 512-dimensional embedding. The crop is resized to
//! 160x160 and standardized with fixed constants; embeddings produced with any
//! other preprocessing are not comparable, and a gallery built with one encoder
//! must not be queried with another.

use crate::model::{ModelAdapter, ModelError, OnnxModel};
use crate::types::Embedding;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array4;
use std::path::Path;

// --- Named constants (different from the detector!) ---
const ENCODER_INPUT_SIZE: usize = 160;
const ENCODER_MEAN: f32 = 0.498;
const ENCODER_STD: f32 = 0.5;
/// Applied after standardization, on the already-shifted values.
const ENCODER_TENSOR_SCALE: f32 = 255.0;
pub const DEFAULT_EMBEDDING_DIM: usize = 512;

/// Capability of turning a face crop into an embedding.
pub trait FaceEncoder: Send + Sync {
    fn embed(&self, face: &DynamicImage) -> Result<Embedding, ModelError>;
}

/// Input/output translation for the face embedding network.
#[derive(Debug, Clone)]
pub struct EncoderAdapter {
    /// Expected embedding length; `None` accepts whatever the model emits.
    expected_dim: Option<usize>,
}

impl EncoderAdapter {
    pub fn new(expected_dim: Option<usize>) -> Self {
        Self { expected_dim }
    }
}

impl Default for EncoderAdapter {
    fn default() -> Self {
        Self::new(Some(DEFAULT_EMBEDDING_DIM))
    }
}

impl ModelAdapter for EncoderAdapter {
    type Output = Embedding;
    const KIND: &'static str = "encoder";

    /// Resize the crop to 160x160 RGB, standardize the raw 0-255 channel values
    /// with the fixed constants, then scale by 1/255.
    fn preprocess(&self, face: &DynamicImage) -> Array4<f32> {
        let size = ENCODER_INPUT_SIZE;
        let resized = face
            .resize_exact(size as u32, size as u32, FilterType::Triangle)
            .to_rgb8();

        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for (channel, &value) in pixel.0.iter().enumerate() {
                tensor[[0, channel, y, x]] = (value as f32 - ENCODER_MEAN) / ENCODER_STD / ENCODER_TENSOR_SCALE;
            }
        }

        tensor
    }

    fn postprocess(&self, raw: &[f32]) -> Result<Embedding, ModelError> {
        if raw.is_empty() {
            return Err(ModelError::InferenceFailed("encoder produced an empty embedding".into()));
        }
        if let Some(dim) = self.expected_dim {
            if raw.len() != dim {
                return Err(ModelError::InferenceFailed(format!(
                    "expected {dim}-dim embedding, got {}",
                    raw.len()
                )));
            }
        }

        Ok(Embedding::new(raw.iter().map(|&v| f64::from(v)).collect()))
    }
}

/// Face encoder backed by an ONNX session.
pub type OnnxFaceEncoder = OnnxModel<EncoderAdapter>;

impl FaceEncoder for OnnxFaceEncoder {
    fn embed(&self, face: &DynamicImage) -> Result<Embedding, ModelError> {
        self.predict(face)
    }
}

/// Load the face embedding model.
pub fn load_encoder(
    model_path: &Path,
    expected_dim: Option<usize>,
    intra_threads: usize,
) -> Result<OnnxFaceEncoder, ModelError> {
    OnnxModel::load(model_path, EncoderAdapter::new(expected_dim), intra_threads)
}
