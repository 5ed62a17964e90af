use crate::error::{DetectError, Result};
use ndarray::{ArrayView2, ArrayView3};

/// A fixed-shape f32 buffer used as model input and output.
///
/// Samples are stored planar: every channel is a full `height x width` plane, rows laid out
/// top to bottom, so the sample at `(channel, row, column)` lives at
/// `channel * height * width + row * width + column`. This is the NCHW layout onnx exports of
/// YOLO expect, minus the batch axis. Output tensors of shape `[1, A, B]` are carried with one
/// channel, `height = A` and `width = B`.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorBuffer {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<f32>,
}

impl TensorBuffer {
    /// A buffer of the given shape with every sample set to `fill`.
    pub fn filled(width: usize, height: usize, channels: usize, fill: f32) -> Self {
        TensorBuffer {
            width,
            height,
            channels,
            data: vec![fill; width * height * channels],
        }
    }

    pub fn from_vec(width: usize, height: usize, channels: usize, data: Vec<f32>) -> Result<Self> {
        let expected = width * height * channels;
        if data.len() != expected {
            return Err(DetectError::Inference(format!(
                "tensor of shape {}x{}x{} needs {} samples, got {}",
                channels,
                height,
                width,
                expected,
                data.len()
            )));
        }
        Ok(TensorBuffer {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn has_shape(&self, width: usize, height: usize, channels: usize) -> bool {
        self.width == width && self.height == height && self.channels == channels
    }

    pub(crate) fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// The `[channels, height, width]` shape this buffer is laid out in.
    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    /// View as a `[channels, height, width]` array.
    pub fn view(&self) -> ArrayView3<'_, f32> {
        // The length invariant is upheld by every constructor.
        ArrayView3::from_shape(self.shape(), &self.data)
            .unwrap_or_else(|_| unreachable!("tensor length matches its shape"))
    }

    /// View of a single channel plane as a `[height, width]` array.
    pub fn plane(&self, channel: usize) -> Option<ArrayView2<'_, f32>> {
        if channel >= self.channels {
            return None;
        }
        let plane = self.width * self.height;
        ArrayView2::from_shape(
            (self.height, self.width),
            &self.data[channel * plane..(channel + 1) * plane],
        )
        .ok()
    }

    pub(crate) fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|sample| *sample = value);
    }
}
