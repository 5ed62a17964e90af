use crate::error::{DetectError, Result};
use crate::image_utils::preprocess::{ChannelOrder, Normalization, ResizePolicy};
use crate::rendering::annotation_renderer::{BOX_THICKNESS, LABEL_FONT_SIZE};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.25;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
pub const DEFAULT_INPUT_SIZE: u32 = 640;

fn default_confidence_threshold() -> f32 {
    DEFAULT_CONFIDENCE_THRESHOLD
}

fn default_iou_threshold() -> f32 {
    DEFAULT_IOU_THRESHOLD
}

fn default_input_size() -> u32 {
    DEFAULT_INPUT_SIZE
}

fn default_box_thickness() -> u32 {
    BOX_THICKNESS
}

fn default_label_font_size() -> f32 {
    LABEL_FONT_SIZE
}

/// Everything needed to build a detection pipeline.
///
/// Only `model_path` is required when read from JSON; every other field has a default.
/// `input_width` and `input_height` are only used when the model declares dynamic input
/// dimensions.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PipelineConfig {
    pub model_path: PathBuf,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_input_size")]
    pub input_width: u32,
    #[serde(default = "default_input_size")]
    pub input_height: u32,
    #[serde(default)]
    pub resize: ResizePolicy,
    #[serde(default)]
    pub normalization: Normalization,
    #[serde(default)]
    pub channel_order: ChannelOrder,
    /// Set for heads that emit an objectness column after the box.
    #[serde(default)]
    pub objectness: bool,
    #[serde(default)]
    pub num_classes: Option<usize>,
    #[serde(default)]
    pub max_detections: Option<usize>,
    #[serde(default)]
    pub class_names_path: Option<PathBuf>,
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default = "default_box_thickness")]
    pub box_thickness: u32,
    #[serde(default = "default_label_font_size")]
    pub label_font_size: f32,
    /// RGB box colours indexed by class id (wrapping). Empty means the built-in palette.
    #[serde(default)]
    pub box_colors: Vec<[u8; 3]>,
}

impl PipelineConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        PipelineConfig {
            model_path: model_path.into(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            resize: ResizePolicy::default(),
            normalization: Normalization::default(),
            channel_order: ChannelOrder::default(),
            objectness: false,
            num_classes: None,
            max_detections: None,
            class_names_path: None,
            font_path: None,
            box_thickness: BOX_THICKNESS,
            label_font_size: LABEL_FONT_SIZE,
            box_colors: Vec::new(),
        }
    }

    pub fn with_thresholds(mut self, confidence_threshold: f32, iou_threshold: f32) -> Self {
        self.confidence_threshold = confidence_threshold;
        self.iou_threshold = iou_threshold;
        self
    }

    /// Reads a JSON config file and validates it.
    pub fn from_json_file(filepath: &Path) -> Result<Self> {
        let file = File::open(filepath).map_err(|e| DetectError::io(filepath, e))?;
        let config: PipelineConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| DetectError::InvalidConfig(format!("{}: {}", filepath.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let in_unit_range = |value: f32| (0.0..=1.0).contains(&value);
        if !in_unit_range(self.confidence_threshold) {
            return Err(DetectError::InvalidConfig(format!(
                "confidence threshold {} is outside [0, 1]",
                self.confidence_threshold
            )));
        }
        if !in_unit_range(self.iou_threshold) {
            return Err(DetectError::InvalidConfig(format!(
                "IoU threshold {} is outside [0, 1]",
                self.iou_threshold
            )));
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err(DetectError::InvalidConfig(format!(
                "input size {}x{} has a zero side",
                self.input_width, self.input_height
            )));
        }
        if self.box_thickness == 0 {
            return Err(DetectError::InvalidConfig(
                "box_thickness must be at least 1".to_string(),
            ));
        }
        if !(self.label_font_size.is_finite() && self.label_font_size > 0.0) {
            return Err(DetectError::InvalidConfig(format!(
                "label font size {} must be positive",
                self.label_font_size
            )));
        }
        if self.num_classes == Some(0) {
            return Err(DetectError::InvalidConfig(
                "num_classes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
