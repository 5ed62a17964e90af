use anyhow::{Result, bail};
use clap::Parser;
use rebar_count::PipelineConfig;
use std::path::PathBuf;

/// Detects and counts rebar cross-sections in photos.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// ONNX model file. Required unless a config file names one.
    #[arg(long, value_name = "FILE")]
    pub model: Option<PathBuf>,

    /// JSON pipeline configuration; command line flags override its values.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Image file, or a directory searched recursively for images.
    #[arg(long, value_name = "PATH")]
    pub input: PathBuf,

    /// Where to write annotated images: a file for a single input, a directory otherwise.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Confidence threshold (0.0 - 1.0).
    #[arg(long, value_name = "THRESHOLD")]
    pub confidence: Option<f32>,

    /// NMS IoU threshold (0.0 - 1.0).
    #[arg(long, value_name = "THRESHOLD")]
    pub iou: Option<f32>,

    /// Text file with one class name per line.
    #[arg(long, value_name = "FILE")]
    pub classes: Option<PathBuf>,

    /// TrueType font used for box labels.
    #[arg(long, value_name = "FILE")]
    pub font: Option<PathBuf>,

    /// Write all detections as JSON to this file.
    #[arg(long, value_name = "FILE")]
    pub json: Option<PathBuf>,
}

impl Args {
    /// Merges the config file (if any) with the flags given on the command line.
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match (&self.config, &self.model) {
            (Some(path), _) => PipelineConfig::from_json_file(path)?,
            (None, Some(model)) => PipelineConfig::new(model),
            (None, None) => bail!("either --model or --config must be given"),
        };
        if let (Some(_), Some(model)) = (&self.config, &self.model) {
            config.model_path = model.clone();
        }
        if let Some(confidence) = self.confidence {
            config.confidence_threshold = confidence;
        }
        if let Some(iou) = self.iou {
            config.iou_threshold = iou;
        }
        if let Some(classes) = &self.classes {
            config.class_names_path = Some(classes.clone());
        }
        if let Some(font) = &self.font {
            config.font_path = Some(font.clone());
        }
        config.validate()?;
        Ok(config)
    }
}
