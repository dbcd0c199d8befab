//! Query-time recognition: classify every face found in one image.

use crate::detector::FaceLocalizer;
use crate::encoder::FaceEncoder;
use crate::imaging;
use crate::matcher::Matcher;
use crate::model::ModelError;
use crate::store::EmbeddingsStore;
use crate::types::{ClassificationResult, Detection};
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error("face detection failed: {0}")]
    Detection(#[source] ModelError),
    #[error("encoding face {index} failed: {source}")]
    Encoding {
        index: usize,
        #[source]
        source: ModelError,
    },
    #[error("face {index}: embedding dimension {actual} does not match gallery dimension {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

/// Model handles and matching strategy used to answer queries.
///
/// Built once and shared by reference; holds no per-query state.
pub struct FaceRecognizer<'a> {
    localizer: &'a dyn FaceLocalizer,
    encoder: &'a dyn FaceEncoder,
    matcher: &'a dyn Matcher,
}

impl<'a> FaceRecognizer<'a> {
    pub fn new(
        localizer: &'a dyn FaceLocalizer,
        encoder: &'a dyn FaceEncoder,
        matcher: &'a dyn Matcher,
    ) -> Self {
        Self {
            localizer,
            encoder,
            matcher,
        }
    }

    /// Detect, embed and classify every face in the image, in detection order.
    ///
    /// Unlike gallery building, no face is filtered out. Faces that no label
    /// claims come back as [`UNKNOWN_LABEL`](crate::types::UNKNOWN_LABEL) with
    /// confidence 0. An embedding whose length differs from the store's is an
    /// error: the gallery was built with a different encoder.
    pub fn predict_faces(
        &self,
        image: &DynamicImage,
        store: &EmbeddingsStore,
    ) -> Result<Vec<ClassificationResult>, RecognizeError> {
        let faces = match self.localizer.detect(image).map_err(RecognizeError::Detection)? {
            Detection::Faces(faces) => faces,
            Detection::NoFace => {
                tracing::debug!("no face detected in query image");
                return Ok(Vec::new());
            }
        };
        tracing::debug!(count = faces.len(), "faces detected in query image");

        let mut results = Vec::with_capacity(faces.len());
        for (index, face) in faces.iter().enumerate() {
            let crop = imaging::crop(image, &face.bbox);
            let embedding = self
                .encoder
                .embed(&crop)
                .map_err(|source| RecognizeError::Encoding { index, source })?;
            if let Some(expected) = store.dimension().filter(|&d| d != embedding.dimension()) {
                return Err(RecognizeError::DimensionMismatch {
                    index,
                    expected,
                    actual: embedding.dimension(),
                });
            }

            let result = match self.matcher.classify(&embedding, store) {
                Some(classification) => ClassificationResult {
                    label: classification.label,
                    confidence: classification.confidence,
                    bbox: face.bbox,
                },
                None => ClassificationResult::unknown(face.bbox),
            };
            tracing::debug!(index, label = %result.label, confidence = result.confidence, "face classified");
            results.push(result);
        }

        Ok(results)
    }
}
