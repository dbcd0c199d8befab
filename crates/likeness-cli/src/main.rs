mod annotate;
mod config;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use likeness_core::detector::load_localizer;
use likeness_core::encoder::load_encoder;
use likeness_core::{
    imaging, BoundingBox, BuildOptions, EmbeddingsStore, FaceRecognizer, GalleryBuilder,
    LabelScope, OnnxFaceEncoder, OnnxFaceLocalizer, VotingMatcher,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "likeness", version, about = "Build face galleries and recognize faces in images")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an embeddings gallery from a directory of per-person folders
    Build {
        /// Root directory; every folder below it is a label
        #[arg(short, long)]
        path: PathBuf,
        /// Gallery file to write
        #[arg(short, long)]
        gallery: PathBuf,
        /// Add 90° and 180° rotated embeddings for every face
        #[arg(long)]
        augment: bool,
        /// Save each face crop under <root parent>/face/<label>/
        #[arg(long)]
        save_faces: bool,
        /// Only treat direct children of the root as labels
        #[arg(long)]
        immediate_labels: bool,
    },
    /// Classify every face in an image against a gallery
    Predict {
        /// Image to classify
        #[arg(short, long)]
        path: PathBuf,
        /// Gallery file built with `likeness build`
        #[arg(short, long)]
        gallery: PathBuf,
        /// Annotated output image (default: <stem>_result.jpg next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
}

/// One face in `predict --json` output.
#[derive(Serialize)]
struct FaceReport {
    index: usize,
    label: String,
    confidence: f64,
    bbox: BoundingBox,
}

#[derive(Serialize)]
struct PredictReport {
    image: PathBuf,
    annotated: PathBuf,
    faces: Vec<FaceReport>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Build {
            path,
            gallery,
            augment,
            save_faces,
            immediate_labels,
        } => {
            let options = BuildOptions {
                augment,
                save_crops: save_faces,
                label_scope: if immediate_labels {
                    LabelScope::ImmediateChildren
                } else {
                    LabelScope::Recursive
                },
            };
            build(&config, &path, &gallery, options)
        }
        Commands::Predict {
            path,
            gallery,
            output,
            json,
        } => {
            let output = output.unwrap_or_else(|| annotate::result_path(&path));
            predict(&config, &path, &gallery, &output, json)
        }
    }
}

fn load_models(config: &Config) -> Result<(OnnxFaceLocalizer, OnnxFaceEncoder)> {
    let detector_path = config.detector_model_path();
    let localizer = load_localizer(&detector_path, config.detection_threshold, config.intra_threads)
        .with_context(|| format!("loading face detector from {}", detector_path.display()))?;

    let encoder_path = config.encoder_model_path();
    let encoder = load_encoder(&encoder_path, config.expected_dim(), config.intra_threads)
        .with_context(|| format!("loading face encoder from {}", encoder_path.display()))?;

    Ok((localizer, encoder))
}

fn build(config: &Config, root: &Path, gallery: &Path, options: BuildOptions) -> Result<()> {
    let (localizer, encoder) = load_models(config)?;

    let (store, report) = GalleryBuilder::new(&localizer, &encoder, options)
        .build(root)
        .with_context(|| format!("building gallery from {}", root.display()))?;

    write_gallery(&store, gallery)?;

    println!(
        "{} labels, {} embeddings from {} of {} images ({} without a face, {} failed) -> {}",
        report.labels,
        report.vectors,
        report.embedded,
        report.images,
        report.no_face,
        report.failed,
        gallery.display()
    );
    Ok(())
}

/// Persist a built gallery. An empty one is still written, so a later
/// `predict` reports every face as unknown instead of failing to load.
fn write_gallery(store: &EmbeddingsStore, gallery: &Path) -> Result<()> {
    if store.is_empty() {
        tracing::warn!(gallery = %gallery.display(), "no face embeddings found; writing an empty gallery");
    }
    store
        .save(gallery)
        .with_context(|| format!("writing gallery to {}", gallery.display()))
}

fn predict(config: &Config, image_path: &Path, gallery: &Path, output: &Path, json: bool) -> Result<()> {
    if !imaging::is_image(image_path) {
        bail!("{} is not a readable image", image_path.display());
    }

    let store = EmbeddingsStore::load(gallery)
        .with_context(|| format!("loading gallery {}", gallery.display()))?;
    let (localizer, encoder) = load_models(config)?;
    let matcher = VotingMatcher::new(config.distance_threshold);
    let recognizer = FaceRecognizer::new(&localizer, &encoder, &matcher);

    let image = imaging::load_oriented(image_path)
        .with_context(|| format!("decoding {}", image_path.display()))?;
    let results = recognizer
        .predict_faces(&image, &store)
        .with_context(|| format!("classifying faces in {}", image_path.display()))?;

    if results.is_empty() {
        tracing::info!(image = %image_path.display(), "no face detected");
    }

    let annotator = annotate::Annotator::new().context("loading caption font")?;
    annotator
        .draw(&image, &results)
        .save(output)
        .with_context(|| format!("writing annotated image {}", output.display()))?;

    if json {
        let report = PredictReport {
            image: image_path.to_path_buf(),
            annotated: output.to_path_buf(),
            faces: results
                .iter()
                .enumerate()
                .map(|(index, result)| FaceReport {
                    index,
                    label: result.label.clone(),
                    confidence: result.confidence,
                    bbox: result.bbox,
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (index, result) in results.iter().enumerate() {
            println!("{}", result.caption(index));
        }
        println!("Annotated image written to {}", output.display());
    }

    Ok(())
}
