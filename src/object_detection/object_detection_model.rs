use crate::error::Result;
use crate::image_utils::tensor_buffer::TensorBuffer;

/// Declared input geometry of a loaded model, in pixels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InputShape {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

/// Defines a trait that all inference backends must follow.
///
/// An engine owns exactly one loaded model. `infer` takes `&mut self`: a model handle is not
/// safe to call from two threads at once, so only one inference may be in flight per engine.
/// Callers that share an engine across threads put it behind a `Mutex` or give each thread
/// its own engine.
pub trait InferenceEngine {
    /// Input tensor size the model was built for.
    fn input_shape(&self) -> InputShape;

    /// Runs the model on a planar `channels x height x width` tensor and returns its single
    /// output tensor, `[1, A, B]` carried as one channel of `A` rows by `B` columns.
    fn infer(&mut self, input: &TensorBuffer) -> Result<TensorBuffer>;
}
