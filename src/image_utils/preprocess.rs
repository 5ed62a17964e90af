use crate::annotations::rectangle::Rectangle;
use crate::error::{DetectError, Result};
use crate::image_utils::image::Image;
use crate::image_utils::tensor_buffer::TensorBuffer;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Grey level used to fill letterbox padding, the value YOLO models are trained with.
pub const LETTERBOX_PAD_VALUE: u8 = 114;

/// How a source image is fitted into the model's input size.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizePolicy {
    /// Scale uniformly until the image fits, centre it and pad the remainder.
    #[default]
    Letterbox,
    /// Scale each axis independently to fill the input exactly.
    Stretch,
}

/// Numeric range 8-bit samples are mapped into.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    #[default]
    ZeroToOne,
    MinusOneToOne,
}

impl Normalization {
    pub fn apply(&self, sample: u8) -> f32 {
        match self {
            Normalization::ZeroToOne => sample as f32 / 255.0,
            Normalization::MinusOneToOne => sample as f32 / 127.5 - 1.0,
        }
    }
}

/// Channel order of the planes written into the input tensor.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

impl ChannelOrder {
    /// Tensor plane index for each of the source's R, G and B samples.
    fn planes(&self) -> [usize; 3] {
        match self {
            ChannelOrder::Rgb => [0, 1, 2],
            ChannelOrder::Bgr => [2, 1, 0],
        }
    }
}

/// The geometric transform a preprocessing step applied to one image.
///
/// A point in the source image maps to `model = image * scale + offset` in model-input
/// pixels. The scales are the ones the resize actually used (after rounding the resized
/// extent to whole pixels), so the inverse in the coordinate mapper undoes it exactly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformRecord {
    pub scale_x: f32,
    pub scale_y: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub source_width: u32,
    pub source_height: u32,
}

impl TransformRecord {
    /// Works out the resize and padding for fitting `source` into `target` under `policy`.
    ///
    /// Returns the record together with the size the image is resized to.
    pub fn for_sizes(
        policy: ResizePolicy,
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<(Self, (u32, u32))> {
        if source_width == 0 || source_height == 0 {
            return Err(DetectError::InvalidImage(format!(
                "image has zero extent ({}x{})",
                source_width, source_height
            )));
        }
        if target_width == 0 || target_height == 0 {
            return Err(DetectError::InvalidConfig(format!(
                "model input has zero extent ({}x{})",
                target_width, target_height
            )));
        }
        let (resized_width, resized_height) = match policy {
            ResizePolicy::Stretch => (target_width, target_height),
            ResizePolicy::Letterbox => {
                let scale = (target_width as f32 / source_width as f32)
                    .min(target_height as f32 / source_height as f32);
                let w = ((source_width as f32 * scale).round() as u32).clamp(1, target_width);
                let h = ((source_height as f32 * scale).round() as u32).clamp(1, target_height);
                (w, h)
            }
        };
        let record = TransformRecord {
            scale_x: resized_width as f32 / source_width as f32,
            scale_y: resized_height as f32 / source_height as f32,
            offset_x: ((target_width - resized_width) / 2) as f32,
            offset_y: ((target_height - resized_height) / 2) as f32,
            source_width,
            source_height,
        };
        Ok((record, (resized_width, resized_height)))
    }

    /// Maps a rectangle from source-image pixels into model-input pixels.
    pub fn apply(&self, rect: &Rectangle) -> Result<Rectangle> {
        Rectangle::new(
            rect.x() * self.scale_x + self.offset_x,
            rect.y() * self.scale_y + self.offset_y,
            rect.width() * self.scale_x,
            rect.height() * self.scale_y,
        )
        .map_err(DetectError::InvalidImage)
    }
}

/// Turns images into the input tensor a model expects.
#[derive(Clone, Debug)]
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
    resize: ResizePolicy,
    normalization: Normalization,
    channel_order: ChannelOrder,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Preprocessor {
            target_width,
            target_height,
            resize: ResizePolicy::default(),
            normalization: Normalization::default(),
            channel_order: ChannelOrder::default(),
        }
    }

    pub fn with_resize(mut self, resize: ResizePolicy) -> Self {
        self.resize = resize;
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn with_channel_order(mut self, channel_order: ChannelOrder) -> Self {
        self.channel_order = channel_order;
        self
    }

    /// Resizes, reorders and normalises `image` into a fresh `3 x H x W` tensor.
    pub fn prepare(&self, image: &Image) -> Result<(TensorBuffer, TransformRecord)> {
        let mut buffer = self.empty_buffer();
        let transform = self.prepare_into(image, &mut buffer)?;
        Ok((buffer, transform))
    }

    /// Same as [`Preprocessor::prepare`] but refills an existing buffer, reallocating only if
    /// its shape does not match the target size.
    pub fn prepare_into(&self, image: &Image, buffer: &mut TensorBuffer) -> Result<TransformRecord> {
        let (transform, (resized_width, resized_height)) = TransformRecord::for_sizes(
            self.resize,
            image.width(),
            image.height(),
            self.target_width,
            self.target_height,
        )?;

        let rgb = image.to_rgb_image();
        let resized = if (resized_width, resized_height) == rgb.dimensions() {
            rgb
        } else {
            imageops::resize(&rgb, resized_width, resized_height, FilterType::Triangle)
        };

        let (width, height) = (self.target_width as usize, self.target_height as usize);
        if !buffer.has_shape(width, height, 3) {
            *buffer = self.empty_buffer();
        }
        buffer.fill(self.normalization.apply(LETTERBOX_PAD_VALUE));

        let plane = width * height;
        let planes = self.channel_order.planes();
        let (offset_x, offset_y) = (transform.offset_x as usize, transform.offset_y as usize);
        let data = buffer.data_mut();
        for (x, y, pixel) in resized.enumerate_pixels() {
            let idx = (offset_y + y as usize) * width + offset_x + x as usize;
            for (sample, plane_ix) in pixel.0.iter().zip(planes) {
                data[plane_ix * plane + idx] = self.normalization.apply(*sample);
            }
        }

        debug!(
            source = %format!("{}x{}", image.width(), image.height()),
            resized = %format!("{}x{}", resized_width, resized_height),
            offset_x,
            offset_y,
            "preprocessed image"
        );
        Ok(transform)
    }

    fn empty_buffer(&self) -> TensorBuffer {
        TensorBuffer::filled(self.target_width as usize, self.target_height as usize, 3, 0.0)
    }
}
