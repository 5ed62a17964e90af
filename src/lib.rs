//! On-device object detection for counting rebar cross-sections in photos.
//!
//! A [`Pipeline`] owns one loaded YOLO model and turns an [`Image`] into a list of
//! [`Detection`]s in original-image pixels; [`Pipeline::annotate`] paints them onto a copy of
//! the image.

pub mod annotations;
pub mod config;
pub mod error;
pub mod image_utils;
pub mod object_detection;
pub mod pipeline;
pub mod rendering;

pub use annotations::detection::{CoordinateSpace, Detection, ImageSpace, ModelSpace};
pub use annotations::rectangle::Rectangle;
pub use config::PipelineConfig;
pub use error::{DetectError, Result};
pub use image_utils::image::{Image, PixelFormat};
pub use image_utils::preprocess::{Preprocessor, TransformRecord};
pub use image_utils::tensor_buffer::TensorBuffer;
pub use object_detection::object_detection_model::{InferenceEngine, InputShape};
pub use pipeline::{Pipeline, create_pipeline};
pub use rendering::annotation_renderer::AnnotationRenderer;
