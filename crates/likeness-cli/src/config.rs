use std::path::PathBuf;

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// File name of the face detection model inside `model_dir`.
    pub detector_model: String,
    /// File name of the face embedding model inside `model_dir`.
    pub encoder_model: String,
    /// Minimum detector score for a face.
    pub detection_threshold: f32,
    /// Largest cosine distance that still counts as a vote.
    pub distance_threshold: f64,
    /// Expected embedding length; 0 disables the check.
    pub embedding_dim: usize,
    /// ONNX Runtime intra-op threads per session.
    pub intra_threads: usize,
}

impl Config {
    /// Load configuration from `LIKENESS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = lookup("LIKENESS_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(likeness_core::default_model_dir);

        Self {
            model_dir,
            detector_model: lookup("LIKENESS_DETECTOR_MODEL")
                .unwrap_or_else(|| "face_detection.onnx".to_string()),
            encoder_model: lookup("LIKENESS_ENCODER_MODEL")
                .unwrap_or_else(|| "vggface2.onnx".to_string()),
            detection_threshold: unit_interval(&lookup, "LIKENESS_DETECTION_THRESHOLD", 0.7),
            distance_threshold: unit_interval(&lookup, "LIKENESS_DISTANCE_THRESHOLD", 0.5),
            embedding_dim: parsed(&lookup, "LIKENESS_EMBEDDING_DIM", 512),
            intra_threads: parsed(&lookup, "LIKENESS_INTRA_THREADS", 2),
        }
    }

    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.detector_model)
    }

    pub fn encoder_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.encoder_model)
    }

    /// Embedding length to enforce, if any.
    pub fn expected_dim(&self) -> Option<usize> {
        (self.embedding_dim > 0).then_some(self.embedding_dim)
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Like [`parsed`], but values outside `[0, 1]` also fall back to the default.
fn unit_interval<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + From<u8> + Copy + std::fmt::Display,
{
    let value = parsed(lookup, key, default);
    if value < T::from(0) || value > T::from(1) {
        tracing::warn!(key, %value, %default, "value outside [0, 1]; using default");
        return default;
    }
    value
}
