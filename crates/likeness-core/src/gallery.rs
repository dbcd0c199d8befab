//! Gallery builder: turns a directory of per-identity images into an
//! [`EmbeddingsStore`].
//!
//! Every directory below the root is a label candidate named after itself.
//! All images below a candidate (at any depth) contribute one embedding each,
//! taken from the largest detected face, plus two rotated variants when
//! augmentation is on.

use crate::augment;
use crate::detector::FaceLocalizer;
use crate::encoder::FaceEncoder;
use crate::imaging;
use crate::store::{EmbeddingsStore, StoreError};
use crate::types::{Detection, Embedding};
use image::DynamicImage;
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Directory, next to the gallery root, that receives saved face crops.
const FACE_FOLDER: &str = "face";
const FACE_CROP_EXTENSION: &str = "jpg";

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery root not found: {0}")]
    RootNotFound(String),
    #[error("gallery root is not a directory: {0}")]
    RootNotDirectory(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Which directories under the root become labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LabelScope {
    /// Every directory at any depth. A nested directory is its own label and
    /// its images also count towards every ancestor label.
    #[default]
    Recursive,
    /// Only direct children of the root.
    ImmediateChildren,
}

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Add 90° and 180° rotated embeddings for every face.
    pub augment: bool,
    /// Write each selected face crop under `<root parent>/face/<label>/`.
    pub save_crops: bool,
    pub label_scope: LabelScope,
}

/// Counters collected over one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Labels in the finished store.
    pub labels: usize,
    /// Image files visited, counted once per label candidate.
    pub images: usize,
    pub embedded: usize,
    pub no_face: usize,
    pub failed: usize,
    /// Embeddings in the finished store.
    pub vectors: usize,
}

/// Result of the per-image pipeline.
enum ImageOutcome {
    Embedded {
        embeddings: Vec<Embedding>,
        /// Selected face, kept only when crops are saved.
        crop: Option<DynamicImage>,
    },
    NoFace,
    Failed,
}

/// Builds galleries with a fixed pair of models and options.
pub struct GalleryBuilder<'a> {
    localizer: &'a dyn FaceLocalizer,
    encoder: &'a dyn FaceEncoder,
    options: BuildOptions,
}

impl<'a> GalleryBuilder<'a> {
    pub fn new(
        localizer: &'a dyn FaceLocalizer,
        encoder: &'a dyn FaceEncoder,
        options: BuildOptions,
    ) -> Self {
        Self {
            localizer,
            encoder,
            options,
        }
    }

    /// Walk `root` and build a store from every label candidate below it.
    ///
    /// Images are processed in parallel; each yields its own vectors, which are
    /// concatenated in path order before a single `add` per label. Crops are
    /// written afterwards, one at a time in the same order. A failing image is
    /// logged and skipped. Labels that end up without any embedding are left
    /// out of the store.
    pub fn build(&self, root: &Path) -> Result<(EmbeddingsStore, BuildReport), GalleryError> {
        if !root.exists() {
            return Err(GalleryError::RootNotFound(root.display().to_string()));
        }
        if !root.is_dir() {
            return Err(GalleryError::RootNotDirectory(root.display().to_string()));
        }
        let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let face_dir = root.parent().unwrap_or(&root).join(FACE_FOLDER);

        tracing::info!(
            root = %root.display(),
            augment = self.options.augment,
            save_crops = self.options.save_crops,
            scope = ?self.options.label_scope,
            "building gallery"
        );

        let mut store = EmbeddingsStore::new();
        let mut report = BuildReport::default();

        for candidate in label_candidates(&root, self.options.label_scope) {
            let Some(label) = label_of(&candidate) else {
                tracing::warn!(dir = %candidate.display(), "directory name is not valid UTF-8; skipping");
                continue;
            };
            tracing::debug!(label = %label, dir = %candidate.display(), "analyzing label directory");

            let images = collect_images(&candidate);
            let outcomes: Vec<ImageOutcome> = images
                .par_iter()
                .map(|path| self.process_image(path))
                .collect();

            report.images += images.len();
            let mut vectors = Vec::new();
            let mut crop_stems = HashSet::new();
            for (path, outcome) in images.iter().zip(outcomes) {
                match outcome {
                    ImageOutcome::Embedded { embeddings, crop } => {
                        report.embedded += 1;
                        vectors.extend(embeddings);
                        if let Some(crop) = crop {
                            let stem = unique_crop_stem(path, &mut crop_stems);
                            save_crop(&crop, &crop_path(&face_dir, &label, &stem, 1));
                        }
                    }
                    ImageOutcome::NoFace => report.no_face += 1,
                    ImageOutcome::Failed => report.failed += 1,
                }
            }

            if vectors.is_empty() {
                tracing::warn!(label = %label, images = images.len(), "no face embeddings for label; leaving it out");
                continue;
            }

            tracing::info!(label = %label, images = images.len(), vectors = vectors.len(), "label embedded");
            if let Some(previous) = store.add(label.clone(), vectors)? {
                tracing::warn!(
                    label = %label,
                    dir = %candidate.display(),
                    replaced = previous.len(),
                    "label name seen twice; later directory replaces earlier one"
                );
            }
        }

        report.labels = store.len();
        report.vectors = store.vector_count();
        tracing::info!(?report, "gallery built");

        Ok((store, report))
    }

    /// Detect → select largest → crop → embed → (save crop) → (augment).
    fn process_image(&self, path: &Path) -> ImageOutcome {
        tracing::debug!(path = %path.display(), "found image");

        let image = match imaging::load_oriented(path) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to decode image; skipping");
                return ImageOutcome::Failed;
            }
        };

        let faces = match self.localizer.detect(&image) {
            Ok(Detection::Faces(faces)) => faces,
            Ok(Detection::NoFace) => {
                tracing::debug!(path = %path.display(), "no face detected");
                return ImageOutcome::NoFace;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "face detection failed; skipping image");
                return ImageOutcome::Failed;
            }
        };

        if faces.len() > 1 {
            tracing::debug!(path = %path.display(), count = faces.len(), "selecting largest face");
        }
        let Some(face) = imaging::select_largest(&faces) else {
            return ImageOutcome::NoFace;
        };

        let crop = imaging::crop(&image, &face.bbox);
        let base = match self.encoder.embed(&crop) {
            Ok(embedding) => embedding,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "face encoding failed; skipping image");
                return ImageOutcome::Failed;
            }
        };

        let mut embeddings = vec![base];
        if self.options.augment {
            embeddings.extend(augment::augment(&crop, self.encoder));
        }

        ImageOutcome::Embedded {
            embeddings,
            crop: self.options.save_crops.then_some(crop),
        }
    }
}

/// Directories that act as labels, in sorted depth-first order.
fn label_candidates(root: &Path, scope: LabelScope) -> Vec<PathBuf> {
    let max_depth = match scope {
        LabelScope::Recursive => usize::MAX,
        LabelScope::ImmediateChildren => 1,
    };

    WalkDir::new(root)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect()
}

/// Image files at any depth below `dir`, sorted by path.
fn collect_images(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file() && imaging::is_image(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

fn label_of(dir: &Path) -> Option<String> {
    dir.file_name()?.to_str().map(str::to_string)
}

/// File stem for an image's crops. A stem already taken within the label
/// (`a.jpg` next to `a.png`) falls back to the full file name.
fn unique_crop_stem(image_path: &Path, taken: &mut HashSet<String>) -> String {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = if taken.contains(&stem) {
        image_path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or(stem)
    } else {
        stem
    };
    taken.insert(stem.clone());
    stem
}

/// Path of the `n`th face crop: `<face_dir>/<label>/<stem>_face<n>.jpg`.
fn crop_path(face_dir: &Path, label: &str, stem: &str, n: usize) -> PathBuf {
    face_dir
        .join(label)
        .join(format!("{stem}_face{n}.{FACE_CROP_EXTENSION}"))
}

/// Write a face crop, overwriting any previous one. Failures are logged only.
fn save_crop(crop: &DynamicImage, path: &Path) {
    let result = path
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .map_err(image::ImageError::from)
        .and_then(|()| crop.to_rgb8().save(path));

    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "saved face crop"),
        Err(err) => tracing::error!(path = %path.display(), error = %err, "failed to write face crop"),
    }
}
