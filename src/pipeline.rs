use crate::annotations::detection::{Detection, ImageSpace};
use crate::config::PipelineConfig;
use crate::error::{DetectError, Result};
use crate::image_utils::image::Image;
use crate::image_utils::preprocess::Preprocessor;
use crate::image_utils::tensor_buffer::TensorBuffer;
use crate::object_detection::coordinate_mapper::all_to_image_space;
use crate::object_detection::detection_decoder::DetectionDecoder;
use crate::object_detection::object_detection_model::InferenceEngine;
use crate::object_detection::object_detection_utils::{
    non_maximum_suppression, read_classes_txt_file,
};
use crate::object_detection::ort_inference_session::OrtInferenceSession;
use crate::rendering::annotation_renderer::AnnotationRenderer;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Loads an onnx model and builds a pipeline around it with default settings.
pub fn create_pipeline(
    model_path: &Path,
    confidence_threshold: f32,
    iou_threshold: f32,
) -> Result<Pipeline> {
    Pipeline::from_config(
        &PipelineConfig::new(model_path).with_thresholds(confidence_threshold, iou_threshold),
    )
}

/// Image in, boxes out: preprocess, infer, decode, suppress, map back to image pixels.
///
/// `detect` is synchronous and takes `&mut self`, so at most one inference runs on the
/// pipeline's engine at a time and the reused input tensor is never refilled while the engine
/// is reading it. To detect from several threads, give each thread its own pipeline or share
/// one behind a `Mutex`. Nothing carries over between calls apart from that buffer, so a
/// failed call can simply be retried.
pub struct Pipeline<E: InferenceEngine = OrtInferenceSession> {
    engine: E,
    preprocessor: Preprocessor,
    decoder: DetectionDecoder,
    renderer: AnnotationRenderer,
    confidence_threshold: f32,
    iou_threshold: f32,
    max_detections: Option<usize>,
    input_buffer: TensorBuffer,
}

impl Pipeline<OrtInferenceSession> {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let engine = OrtInferenceSession::new(
            &config.model_path,
            (config.input_width, config.input_height),
        )?;
        Pipeline::with_engine(engine, config)
    }
}

impl<E: InferenceEngine> Pipeline<E> {
    /// Builds a pipeline over an already loaded engine. `config.model_path` is not read.
    pub fn with_engine(engine: E, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let input = engine.input_shape();
        if input.channels != 3 || input.width == 0 || input.height == 0 {
            return Err(DetectError::ModelShape(format!(
                "model input is {}x{}x{}, expected 3 channels and a non-zero size",
                input.channels, input.height, input.width
            )));
        }
        let preprocessor = Preprocessor::new(input.width, input.height)
            .with_resize(config.resize)
            .with_normalization(config.normalization)
            .with_channel_order(config.channel_order);

        let mut renderer = AnnotationRenderer::new()
            .with_thickness(config.box_thickness)
            .with_font_size(config.label_font_size)
            .with_palette(config.box_colors.clone());
        if let Some(path) = &config.class_names_path {
            let class_names = read_classes_txt_file(path)?;
            info!("loaded {} class names from {}", class_names.len(), path.display());
            renderer = renderer.with_class_names(class_names);
        }
        if let Some(path) = &config.font_path {
            renderer = renderer.with_font_file(path)?;
        }

        Ok(Pipeline {
            engine,
            preprocessor,
            decoder: DetectionDecoder::new(config.num_classes, config.objectness),
            renderer,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
            input_buffer: TensorBuffer::filled(input.width as usize, input.height as usize, 3, 0.0),
        })
    }

    /// Runs the full detection pipeline on one image.
    ///
    /// An image with nothing above the confidence threshold gives `Ok` with an empty vector;
    /// every failure along the way is returned as an error instead.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn detect(&mut self, image: &Image) -> Result<Vec<Detection<ImageSpace>>> {
        let started = Instant::now();
        let transform = self.preprocessor.prepare_into(image, &mut self.input_buffer)?;
        let preprocessed = Instant::now();

        let output = self.engine.infer(&self.input_buffer)?;
        let inferred = Instant::now();

        let candidates = self.decoder.decode(&output, self.confidence_threshold)?;
        let candidate_count = candidates.len();
        let kept = non_maximum_suppression(candidates, self.iou_threshold);
        // Boxes lying wholly in the letterbox padding cover no image pixels.
        let mut detections: Vec<Detection<ImageSpace>> = all_to_image_space(&kept, &transform)
            .into_iter()
            .filter(|detection| !detection.rect().is_degenerate())
            .collect();
        if let Some(max_detections) = self.max_detections {
            detections.truncate(max_detections);
        }

        debug!(
            candidates = candidate_count,
            detections = detections.len(),
            preprocess_ms = (preprocessed - started).as_secs_f64() * 1000.0,
            inference_ms = (inferred - preprocessed).as_secs_f64() * 1000.0,
            postprocess_ms = inferred.elapsed().as_secs_f64() * 1000.0,
            "detection finished"
        );
        Ok(detections)
    }

    /// Number of objects found in `image`.
    pub fn count(&mut self, image: &Image) -> Result<usize> {
        Ok(self.detect(image)?.len())
    }

    /// Draws `detections` onto a copy of `image`.
    pub fn annotate(&self, image: &Image, detections: &[Detection<ImageSpace>]) -> Result<Image> {
        self.renderer.annotate(image, detections)
    }

    pub fn renderer(&self) -> &AnnotationRenderer {
        &self.renderer
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn iou_threshold(&self) -> f32 {
        self.iou_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::rectangle::Rectangle;
    use crate::object_detection::object_detection_model::InputShape;
    use image::{Rgb, RgbImage};

    /// Stands in for a model: returns a fixed output tensor and remembers what it was fed.
    struct FakeEngine {
        input: InputShape,
        output: Option<TensorBuffer>,
        calls: usize,
        last_input_shape: Option<[usize; 3]>,
    }

    impl FakeEngine {
        fn returning(anchors: &[[f32; 6]]) -> Self {
            // Feature-major [6, N]: cx, cy, w, h, class 0, class 1.
            let mut data = vec![0.0; 6 * anchors.len()];
            for (a, anchor) in anchors.iter().enumerate() {
                for (f, value) in anchor.iter().enumerate() {
                    data[f * anchors.len() + a] = *value;
                }
            }
            FakeEngine {
                input: InputShape {
                    width: 640,
                    height: 640,
                    channels: 3,
                },
                output: Some(TensorBuffer::from_vec(anchors.len(), 6, 1, data).unwrap()),
                calls: 0,
                last_input_shape: None,
            }
        }

        fn failing() -> Self {
            FakeEngine {
                output: None,
                ..FakeEngine::returning(&[])
            }
        }
    }

    impl InferenceEngine for FakeEngine {
        fn input_shape(&self) -> InputShape {
            self.input
        }

        fn infer(&mut self, input: &TensorBuffer) -> Result<TensorBuffer> {
            self.calls += 1;
            self.last_input_shape = Some(input.shape());
            self.output
                .clone()
                .ok_or_else(|| DetectError::Inference("device lost".to_string()))
        }
    }

    fn config() -> PipelineConfig {
        let mut config = PipelineConfig::new("unused.onnx").with_thresholds(0.5, 0.5);
        config.num_classes = Some(2);
        config
    }

    fn image(width: u32, height: u32) -> Image {
        Image::from(RgbImage::from_pixel(width, height, Rgb([128, 128, 128])))
    }

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rectangle {
        Rectangle::new(x, y, w, h).unwrap()
    }

    #[test]
    fn lone_candidate_passes_through_unchanged() {
        // Centre-encoded (100, 100, 50, 50).
        let engine = FakeEngine::returning(&[[125.0, 125.0, 50.0, 50.0, 0.9, 0.0]]);
        let mut pipeline = Pipeline::with_engine(engine, &config()).unwrap();
        let dets = pipeline.detect(&image(640, 640)).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(*dets[0].rect(), rect(100.0, 100.0, 50.0, 50.0));
        assert_eq!(dets[0].confidence(), 0.9);
        assert_eq!(dets[0].class_id(), 0);
        assert_eq!(pipeline.engine().last_input_shape, Some([3, 640, 640]));
    }

    #[test]
    fn overlapping_pair_collapses_to_higher_confidence() {
        let engine = FakeEngine::returning(&[
            [20.0, 20.0, 20.0, 20.0, 0.0, 0.8],
            [22.0, 22.0, 20.0, 20.0, 0.0, 0.6],
        ]);
        let mut pipeline = Pipeline::with_engine(engine, &config()).unwrap();
        let dets = pipeline.detect(&image(640, 640)).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id(), 1);
        assert_eq!(dets[0].confidence(), 0.8);
        assert_eq!(*dets[0].rect(), rect(10.0, 10.0, 20.0, 20.0));
    }

    #[test]
    fn nothing_found_is_empty_success() {
        let engine = FakeEngine::returning(&[[125.0, 125.0, 50.0, 50.0, 0.1, 0.2]]);
        let mut pipeline = Pipeline::with_engine(engine, &config()).unwrap();
        assert!(pipeline.detect(&image(640, 480)).unwrap().is_empty());
        assert_eq!(pipeline.count(&image(640, 480)).unwrap(), 0);
    }

    #[test]
    fn engine_failure_is_an_error_not_an_empty_result() {
        let mut pipeline = Pipeline::with_engine(FakeEngine::failing(), &config()).unwrap();
        let err = pipeline.detect(&image(64, 64)).unwrap_err();
        assert!(matches!(err, DetectError::Inference(_)));
        // The same input can be retried.
        assert!(pipeline.detect(&image(64, 64)).is_err());
        assert_eq!(pipeline.engine().calls, 2);
    }

    #[test]
    fn invalid_image_never_reaches_the_engine() {
        let engine = FakeEngine::returning(&[[125.0, 125.0, 50.0, 50.0, 0.9, 0.0]]);
        let mut pipeline = Pipeline::with_engine(engine, &config()).unwrap();
        let empty = Image::from_raw(0, 0, 3, vec![]).unwrap();
        let err = pipeline.detect(&empty).unwrap_err();
        assert!(matches!(err, DetectError::InvalidImage(_)));
        assert_eq!(pipeline.engine().calls, 0);
    }

    #[test]
    fn letterboxed_boxes_map_back_to_image_pixels() {
        // 1280x640 letterboxes to 640x320 at offset (0, 160), scale 0.5.
        let engine = FakeEngine::returning(&[[125.0, 285.0, 50.0, 50.0, 0.0, 0.95]]);
        let mut pipeline = Pipeline::with_engine(engine, &config()).unwrap();
        let dets = pipeline.detect(&image(1280, 640)).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(*dets[0].rect(), rect(200.0, 200.0, 100.0, 100.0));
    }

    #[test]
    fn box_inside_padding_band_is_not_counted() {
        // 1280x640 letterboxes with a 160 pixel band above the image; this box sits in it.
        let engine = FakeEngine::returning(&[
            [300.0, 50.0, 40.0, 40.0, 0.9, 0.0],
            [125.0, 285.0, 50.0, 50.0, 0.0, 0.8],
        ]);
        let mut pipeline = Pipeline::with_engine(engine, &config()).unwrap();
        let dets = pipeline.detect(&image(1280, 640)).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id(), 1);
        assert!(dets.iter().all(|d| !d.rect().is_degenerate()));
        assert_eq!(pipeline.count(&image(1280, 640)).unwrap(), 1);
    }

    #[test]
    fn max_detections_keeps_the_most_confident() {
        let engine = FakeEngine::returning(&[
            [50.0, 50.0, 10.0, 10.0, 0.6, 0.0],
            [150.0, 50.0, 10.0, 10.0, 0.9, 0.0],
            [250.0, 50.0, 10.0, 10.0, 0.7, 0.0],
        ]);
        let mut config = config();
        config.max_detections = Some(2);
        let mut pipeline = Pipeline::with_engine(engine, &config).unwrap();
        let confidences: Vec<f32> = pipeline
            .detect(&image(640, 640))
            .unwrap()
            .iter()
            .map(|d| d.confidence())
            .collect();
        assert_eq!(confidences, vec![0.9, 0.7]);
    }

    #[test]
    fn box_style_comes_from_config() {
        let engine = FakeEngine::returning(&[[125.0, 125.0, 50.0, 50.0, 0.9, 0.0]]);
        let mut config = config();
        config.box_colors = vec![[1, 2, 3]];
        config.box_thickness = 3;
        let mut pipeline = Pipeline::with_engine(engine, &config).unwrap();
        let input = image(640, 640);
        let dets = pipeline.detect(&input).unwrap();
        let annotated = pipeline.annotate(&input, &dets).unwrap();
        // Box spans 100..150; its third outline ring is at x = 102.
        assert_eq!(annotated.rgb_at(102, 125), Some([1, 2, 3]));
        assert_eq!(annotated.rgb_at(103, 125), Some([128, 128, 128]));
    }

    #[test]
    fn rejects_bad_thresholds_and_shapes() {
        let engine = FakeEngine::returning(&[]);
        let bad = config().with_thresholds(0.5, 2.0);
        assert!(matches!(
            Pipeline::with_engine(engine, &bad).err(),
            Some(DetectError::InvalidConfig(_))
        ));

        let mut grey_model = FakeEngine::returning(&[]);
        grey_model.input.channels = 1;
        assert!(matches!(
            Pipeline::with_engine(grey_model, &config()).err(),
            Some(DetectError::ModelShape(_))
        ));
    }

    #[test]
    fn missing_model_file_fails_construction() {
        let err = create_pipeline(Path::new("./no/such/model.onnx"), 0.25, 0.45).err();
        assert!(matches!(err, Some(DetectError::ModelLoad { .. })));
    }

    #[test]
    fn annotate_leaves_input_alone() {
        let engine = FakeEngine::returning(&[[125.0, 125.0, 50.0, 50.0, 0.9, 0.0]]);
        let mut pipeline = Pipeline::with_engine(engine, &config()).unwrap();
        let input = image(640, 640);
        let dets = pipeline.detect(&input).unwrap();
        let first = pipeline.annotate(&input, &dets).unwrap();
        let second = pipeline.annotate(&input, &dets).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, input);
        assert_eq!(input, image(640, 640));
    }
}
