use crate::annotations::detection::{Detection, ModelSpace};
use crate::annotations::rectangle::Rectangle;
use crate::error::{DetectError, Result};
use crate::image_utils::tensor_buffer::TensorBuffer;
use ndarray::Axis;
use tracing::debug;

/// Reads YOLO style detector heads: one row per anchor holding
/// `cx, cy, w, h, [objectness,] class scores...` in model-input pixels.
///
/// Exports differ in whether the output is feature-major (`[1, 4 + C, N]`, the ultralytics
/// default) or anchor-major (`[1, N, 4 + C]`); both are accepted. When the class count is not
/// configured the shorter output axis is taken to be the feature axis.
#[derive(Clone, Debug, Default)]
pub struct DetectionDecoder {
    num_classes: Option<usize>,
    objectness: bool,
}

impl DetectionDecoder {
    pub fn new(num_classes: Option<usize>, objectness: bool) -> Self {
        DetectionDecoder {
            num_classes,
            objectness,
        }
    }

    fn box_features(&self) -> usize {
        if self.objectness { 5 } else { 4 }
    }

    /// Turns a raw output tensor into model-space candidates scoring at least
    /// `confidence_threshold`.
    ///
    /// A candidate's confidence is `objectness * max(class scores)` (objectness is 1 for heads
    /// without that column) and its class is the index of the best class score, the lowest
    /// index winning ties. Boxes with non-positive width or height are dropped.
    pub fn decode(
        &self,
        output: &TensorBuffer,
        confidence_threshold: f32,
    ) -> Result<Vec<Detection<ModelSpace>>> {
        let view = output.plane(0).ok_or_else(|| {
            DetectError::Inference("model output tensor is empty".to_string())
        })?;
        let (rows, columns) = view.dim();
        let feature_major = match self.num_classes {
            Some(classes) => {
                let features = self.box_features() + classes;
                if rows == features {
                    true
                } else if columns == features {
                    false
                } else {
                    return Err(DetectError::Inference(format!(
                        "output is {}x{}, neither axis holds {} features for {} classes",
                        rows, columns, features, classes
                    )));
                }
            }
            None => rows <= columns,
        };
        let candidates = if feature_major { view.reversed_axes() } else { view };
        let features = candidates.ncols();
        if features <= self.box_features() {
            return Err(DetectError::Inference(format!(
                "output rows have {} values, need more than {}",
                features,
                self.box_features()
            )));
        }

        let mut detections: Vec<Detection<ModelSpace>> = Vec::new();
        let mut degenerate = 0usize;
        for row in candidates.axis_iter(Axis(0)) {
            let (class_id, class_score) = row
                .iter()
                .skip(self.box_features()) // skips bounding box coords.
                .copied()
                .enumerate()
                .reduce(|accum, row| if row.1 > accum.1 { row } else { accum })
                .unwrap_or((0, 0.0));
            let objectness = if self.objectness { row[4] } else { 1.0 };
            let confidence = objectness * class_score;
            if !confidence.is_finite() || confidence < confidence_threshold {
                continue;
            }
            let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
            if !(w > 0.0 && h > 0.0) {
                degenerate += 1;
                continue;
            }
            let Ok(rect) = Rectangle::from_center(cx, cy, w, h) else {
                degenerate += 1;
                continue;
            };
            detections.push(Detection::new(rect, confidence.min(1.0), class_id));
        }
        debug!(
            anchors = candidates.nrows(),
            kept = detections.len(),
            degenerate,
            confidence_threshold,
            "decoded detector output"
        );
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feature-major output (`[features, anchors]`) from per-anchor rows.
    fn feature_major(anchors: &[Vec<f32>]) -> TensorBuffer {
        let features = anchors[0].len();
        let mut data = vec![0.0; features * anchors.len()];
        for (a, anchor) in anchors.iter().enumerate() {
            for (f, value) in anchor.iter().enumerate() {
                data[f * anchors.len() + a] = *value;
            }
        }
        TensorBuffer::from_vec(anchors.len(), features, 1, data).unwrap()
    }

    fn anchor_major(anchors: &[Vec<f32>]) -> TensorBuffer {
        let features = anchors[0].len();
        let data = anchors.iter().flatten().copied().collect();
        TensorBuffer::from_vec(features, anchors.len(), 1, data).unwrap()
    }

    fn anchors() -> Vec<Vec<f32>> {
        vec![
            // cx, cy, w, h, class 0, class 1
            vec![125.0, 125.0, 50.0, 50.0, 0.9, 0.1],
            vec![20.0, 20.0, 20.0, 20.0, 0.2, 0.8],
            vec![300.0, 300.0, 10.0, 10.0, 0.1, 0.2],
            vec![400.0, 400.0, 0.0, 10.0, 0.95, 0.0],
            vec![50.0, 60.0, 10.0, 10.0, 0.7, 0.7],
            vec![10.0, 10.0, 4.0, 4.0, 0.3, 0.2],
            vec![10.0, 10.0, 4.0, 4.0, 0.3, 0.2],
        ]
    }

    #[test]
    fn decodes_feature_major_output() {
        let decoder = DetectionDecoder::new(Some(2), false);
        let dets = decoder.decode(&feature_major(&anchors()), 0.5).unwrap();
        assert_eq!(dets.len(), 3);

        assert_eq!(dets[0].class_id(), 0);
        assert_eq!(dets[0].confidence(), 0.9);
        assert_eq!(*dets[0].rect(), Rectangle::new(100.0, 100.0, 50.0, 50.0).unwrap());

        assert_eq!(dets[1].class_id(), 1);
        assert_eq!(*dets[1].rect(), Rectangle::new(10.0, 10.0, 20.0, 20.0).unwrap());

        // Equal class scores resolve to the lower class id.
        assert_eq!(dets[2].class_id(), 0);
    }

    #[test]
    fn anchor_major_gives_same_result() {
        let decoder = DetectionDecoder::new(Some(2), false);
        let a = decoder.decode(&feature_major(&anchors()), 0.5).unwrap();
        let b = decoder.decode(&anchor_major(&anchors()), 0.5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn nothing_below_threshold_is_returned() {
        let decoder = DetectionDecoder::new(None, false);
        for threshold in [0.0, 0.25, 0.5, 0.75, 0.9, 0.95] {
            let dets = decoder.decode(&feature_major(&anchors()), threshold).unwrap();
            assert!(dets.iter().all(|d| d.confidence() >= threshold));
        }
    }

    #[test]
    fn degenerate_boxes_are_dropped() {
        let decoder = DetectionDecoder::new(Some(2), false);
        let dets = decoder.decode(&feature_major(&anchors()), 0.0).unwrap();
        assert!(dets.iter().all(|d| !d.rect().is_degenerate()));
        assert_eq!(dets.len(), anchors().len() - 1);
    }

    #[test]
    fn objectness_scales_confidence() {
        let decoder = DetectionDecoder::new(Some(1), true);
        let output = feature_major(&[
            vec![50.0, 50.0, 10.0, 10.0, 0.5, 0.8],
            vec![80.0, 80.0, 10.0, 10.0, 0.9, 0.9],
        ]);
        let dets = decoder.decode(&output, 0.5).unwrap();
        assert_eq!(dets.len(), 1);
        assert!((dets[0].confidence() - 0.81).abs() < 1e-6);
    }

    #[test]
    fn mismatched_class_count_is_an_error() {
        let decoder = DetectionDecoder::new(Some(80), false);
        let err = decoder.decode(&feature_major(&anchors()), 0.5).unwrap_err();
        assert!(matches!(err, DetectError::Inference(_)));
    }

    #[test]
    fn empty_output_decodes_to_nothing() {
        let decoder = DetectionDecoder::new(Some(1), false);
        let output = TensorBuffer::from_vec(0, 5, 1, vec![]).unwrap();
        assert!(decoder.decode(&output, 0.25).unwrap().is_empty());
    }
}
