//! ONNX Runtime model handle shared by the localizer and the encoder.
//!
//! Each model kind provides a [`ModelAdapter`] that turns an image into the
//! network's input tensor and the raw output back into a domain value. The
//! session itself is generic and knows nothing about faces.

use image::DynamicImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model file not found: {0}; export the network to ONNX and place it in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Input/output translation for one model kind.
pub trait ModelAdapter: Send + Sync {
    type Output;

    /// Short name used in log lines and error messages.
    const KIND: &'static str;

    fn preprocess(&self, image: &DynamicImage) -> Array4<f32>;

    fn postprocess(&self, raw: &[f32]) -> Result<Self::Output, ModelError>;
}

/// A loaded ONNX session paired with its adapter.
///
/// `Session::run` needs exclusive access, so concurrent callers are
/// serialized on the mutex.
pub struct OnnxModel<A> {
    session: Mutex<Session>,
    adapter: A,
}

impl<A: ModelAdapter> OnnxModel<A> {
    /// Load an ONNX model from the given path.
    pub fn load(model_path: &Path, adapter: A, intra_threads: usize) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads.max(1))?
            .commit_from_file(model_path)?;

        tracing::info!(
            kind = A::KIND,
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded model"
        );

        Ok(Self {
            session: Mutex::new(session),
            adapter,
        })
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Run the full preprocess → inference → postprocess chain on one image.
    pub fn predict(&self, image: &DynamicImage) -> Result<A::Output, ModelError> {
        let input = self.adapter.preprocess(image);

        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::InferenceFailed(format!("{} session lock poisoned", A::KIND)))?;

        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::InferenceFailed(format!("{} output: {e}", A::KIND)))?;

        self.adapter.postprocess(raw)
    }
}
