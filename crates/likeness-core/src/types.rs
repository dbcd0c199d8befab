use serde::{Deserialize, Serialize};

/// Label reported for a face that no gallery identity claims.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Bounding box for a detected face, normalized to [0, 1] of the image extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Area in normalized units.
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Convert to a pixel rectangle `(x, y, width, height)` clamped to the image.
    ///
    /// A negative origin clamps to 0 and an extent running past the right or
    /// bottom edge is shortened. The result is never empty for a non-empty image.
    pub fn to_pixel_rect(&self, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let (x, w) = clamp_span(self.x, self.width, image_width);
        let (y, h) = clamp_span(self.y, self.height, image_height);
        (x, y, w, h)
    }
}

fn clamp_span(origin: f32, extent: f32, limit: u32) -> (u32, u32) {
    let limit = i64::from(limit.max(1));
    let start = ((origin * limit as f32) as i64).clamp(0, limit - 1);
    let mut len = (extent * limit as f32) as i64;
    if start + len > limit {
        len = limit - start;
    }
    (start as u32, len.max(1) as u32)
}

/// Detector class for a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaceClass {
    NotFace,
    Face,
}

impl FaceClass {
    /// Map a raw detector class id (0 = not face, 1 = face).
    pub fn from_class_id(id: f32) -> Self {
        if id.round() as i64 == 1 {
            FaceClass::Face
        } else {
            FaceClass::NotFace
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FaceClass::Face => "Face",
            FaceClass::NotFace => "Not Face",
        }
    }
}

/// A face region reported by the localizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub bbox: BoundingBox,
    pub class: FaceClass,
    pub confidence: f32,
}

/// Outcome of running the localizer on one image.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// At least one face, in detector output order.
    Faces(Vec<DetectedFace>),
    NoFace,
}

impl Detection {
    pub fn from_faces(faces: Vec<DetectedFace>) -> Self {
        if faces.is_empty() {
            Detection::NoFace
        } else {
            Detection::Faces(faces)
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Detection::Faces(faces) => faces.len(),
            Detection::NoFace => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Detection::NoFace)
    }
}

/// Face embedding vector (512-dimensional for the VGGFace2 encoder).
///
/// No normalization is assumed; distances are computed on raw values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f64>,
}

impl Embedding {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Cosine similarity in [-1, 1]. A zero-norm operand yields 0.
    pub fn similarity(&self, other: &Embedding) -> f64 {
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        // sqrt of the product keeps identical inputs at exactly 1.0
        let denom = (norm_a * norm_b).sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Cosine distance `|1 - cos|`. Lower = more similar.
    pub fn distance(&self, other: &Embedding) -> f64 {
        (1.0 - self.similarity(other)).abs()
    }
}

impl From<Vec<f64>> for Embedding {
    fn from(values: Vec<f64>) -> Self {
        Self { values }
    }
}

/// Best label for a query embedding, before it is tied to a face region.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    /// `1 - ratio` of the winning label, in [0, 1].
    pub confidence: f64,
}

/// Classification of one detected face in a query image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: String,
    pub confidence: f64,
    pub bbox: BoundingBox,
}

impl ClassificationResult {
    pub fn unknown(bbox: BoundingBox) -> Self {
        Self {
            label: UNKNOWN_LABEL.to_string(),
            confidence: 0.0,
            bbox,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.label == UNKNOWN_LABEL
    }

    /// Display text `"<label> - <confidence> - <index>"` used for annotations.
    pub fn caption(&self, index: usize) -> String {
        format!("{} - {:.2} - {}", self.label, self.confidence, index)
    }
}
