//! likeness-core — Face gallery building and recognition engine.
//!
//! A face detector and a face embedding network, both running via ONNX
//! Runtime for CPU inference, turn per-identity image folders into a
//! persisted embeddings store. Query faces are named by a threshold-gated
//! similarity vote over that store.

pub mod augment;
pub mod detector;
pub mod encoder;
pub mod gallery;
pub mod imaging;
pub mod matcher;
pub mod model;
pub mod recognize;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

use std::path::PathBuf;

pub use detector::{FaceLocalizer, OnnxFaceLocalizer};
pub use encoder::{FaceEncoder, OnnxFaceEncoder};
pub use gallery::{BuildOptions, BuildReport, GalleryBuilder, GalleryError, LabelScope};
pub use matcher::{Matcher, VotingMatcher};
pub use model::ModelError;
pub use recognize::{FaceRecognizer, RecognizeError};
pub use store::{EmbeddingsStore, StoreError};
pub use types::{BoundingBox, Classification, ClassificationResult, Detection, Embedding};

/// Default location of the ONNX model files: `$XDG_DATA_HOME/likeness/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("likeness")
        .join("models")
}
