use crate::annotations::rectangle::Rectangle;
use std::fmt;
use std::marker::PhantomData;

/// Marker for the coordinate space a detection's box lives in.
pub trait CoordinateSpace: fmt::Debug + Clone + Copy + PartialEq {
    const NAME: &'static str;
}

/// Pixel coordinates of the tensor fed to the model, after resize and padding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModelSpace;

/// Pixel coordinates of the original, unresized image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageSpace;

impl CoordinateSpace for ModelSpace {
    const NAME: &'static str = "model";
}

impl CoordinateSpace for ImageSpace {
    const NAME: &'static str = "image";
}

/// A detection is what is produced as output from an object detection model.
///
/// A detection is a box combined with a class id and a confidence score: a probability value
/// that encodes the model's belief that the detection is true. The space parameter names which
/// pixel grid the box is measured in. Detections are immutable once built; only the decoder
/// creates `Detection<ModelSpace>` and only the coordinate mapper turns one into a
/// `Detection<ImageSpace>`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection<S: CoordinateSpace> {
    rect: Rectangle,
    confidence: f32,
    class_id: usize,
    space: PhantomData<S>,
}

impl<S: CoordinateSpace> Detection<S> {
    pub(crate) fn new(rect: Rectangle, confidence: f32, class_id: usize) -> Self {
        Detection {
            rect,
            confidence,
            class_id,
            space: PhantomData,
        }
    }

    pub fn rect(&self) -> &Rectangle {
        &self.rect
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn class_id(&self) -> usize {
        self.class_id
    }
}

#[cfg(test)]
impl Detection<ModelSpace> {
    /// Model-space candidate for mapper tests, confidence clamped to [0, 1].
    pub(crate) fn in_model_space(rect: Rectangle, confidence: f32, class_id: usize) -> Self {
        Detection::new(rect, confidence.clamp(0.0, 1.0), class_id)
    }
}

impl<S: CoordinateSpace> fmt::Display for Detection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Detection {{ class: {}, confidence: {:.3}, {} space: {} }}",
            self.class_id,
            self.confidence,
            S::NAME,
            self.rect
        )
    }
}
