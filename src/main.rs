mod args;

use anyhow::{Context, Result, bail};
use clap::Parser;
use itertools::Itertools;
use rebar_count::image_utils::image_io::{read_image, save_image};
use rebar_count::{Detection, ImageSpace, Pipeline};
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "webp", "tif", "tiff"];

/// One detection as written to the JSON report, in original-image pixels.
#[derive(Debug, Serialize)]
struct DetectionRecord {
    class_id: usize,
    class_name: String,
    confidence: f32,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct ImageReport {
    image: PathBuf,
    count: usize,
    detections: Vec<DetectionRecord>,
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// The input itself if it is a file, otherwise every image below it in path order.
fn collect_images(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("Input path does not exist, or cannot be read: {:?}", input);
    }
    let mut images = Vec::new();
    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", input.display()))?;
        if entry.file_type().is_file() && is_image(entry.path()) {
            images.push(entry.into_path());
        }
    }
    Ok(images)
}

fn annotated_path(input: &Path, image_path: &Path, output: &Path) -> PathBuf {
    if input.is_file() {
        return output.to_path_buf();
    }
    let relative = image_path.strip_prefix(input).unwrap_or(image_path);
    output.join(relative)
}

fn report(pipeline: &Pipeline, image_path: &Path, detections: &[Detection<ImageSpace>]) -> ImageReport {
    let renderer = pipeline.renderer();
    ImageReport {
        image: image_path.to_path_buf(),
        count: detections.len(),
        detections: detections
            .iter()
            .map(|det| DetectionRecord {
                class_id: det.class_id(),
                class_name: renderer.class_name(det.class_id()),
                confidence: det.confidence(),
                x: det.rect().x(),
                y: det.rect().y(),
                width: det.rect().width(),
                height: det.rect().height(),
            })
            .collect(),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = args::Args::parse();

    let config = args.pipeline_config()?;
    info!(
        model = %config.model_path.display(),
        confidence = config.confidence_threshold,
        iou = config.iou_threshold,
        "building pipeline"
    );
    let mut pipeline = Pipeline::from_config(&config)
        .with_context(|| format!("failed to build pipeline for {}", config.model_path.display()))?;

    let images = collect_images(&args.input)?;
    if images.is_empty() {
        bail!("no images found under {}", args.input.display());
    }

    let mut reports = Vec::new();
    let mut failures = 0usize;
    for image_path in &images {
        let image = match read_image(image_path) {
            Ok(image) => image,
            Err(e) => {
                warn!("skipping {}: {}", image_path.display(), e);
                failures += 1;
                continue;
            }
        };
        let detections = match pipeline.detect(&image) {
            Ok(detections) => detections,
            Err(e) => {
                warn!("detection failed on {}: {}", image_path.display(), e);
                failures += 1;
                continue;
            }
        };

        let per_class = detections
            .iter()
            .counts_by(|det| det.class_id())
            .into_iter()
            .sorted()
            .map(|(class_id, count)| format!("{}: {}", pipeline.renderer().class_name(class_id), count))
            .join(", ");
        println!("{}: {} objects [{}]", image_path.display(), detections.len(), per_class);

        if let Some(output) = &args.output {
            let target = annotated_path(&args.input, image_path, output);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            let annotated = pipeline.annotate(&image, &detections)?;
            save_image(&annotated, &target)
                .with_context(|| format!("failed to save {}", target.display()))?;
            info!("annotated image written to {}", target.display());
        }
        reports.push(report(&pipeline, image_path, &detections));
    }

    if let Some(json_path) = &args.json {
        let file = File::create(json_path)
            .with_context(|| format!("failed to create {}", json_path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &reports)
            .with_context(|| format!("failed to write {}", json_path.display()))?;
    }

    let total: usize = reports.iter().map(|r| r.count).sum();
    println!(
        "Processed {} images ({} failed), {} objects in total.",
        reports.len(),
        failures,
        total
    );
    Ok(())
}
