use crate::error::{DetectError, Result};
use crate::image_utils::tensor_buffer::TensorBuffer;
use crate::object_detection::object_detection_model::{InferenceEngine, InputShape};
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use std::path::Path;
use tracing::{debug, error, info};

/// An onnxruntime inference session.
///
/// Owns the session for one model file; the session is dropped with the engine. Input and
/// output shapes are checked once, at load time, against the single-input single-output
/// detector layout the rest of the pipeline assumes.
pub struct OrtInferenceSession {
    session: Session,
    output_name: String,
    input_shape: InputShape,
}

impl OrtInferenceSession {
    /// Loads `model_path`. Dynamic input height or width fall back to `default_input`.
    pub fn new(model_path: &Path, default_input: (u32, u32)) -> Result<Self> {
        let load_error = |message: String| DetectError::ModelLoad {
            path: model_path.to_path_buf(),
            message,
        };
        if !model_path.is_file() {
            return Err(load_error("path does not exist or is not a file".to_string()));
        }

        info!("loading model {}", model_path.display());
        let session = Session::builder()
            .map_err(|e| load_error(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| load_error(e.to_string()))?;

        if session.inputs.len() != 1 || session.outputs.len() != 1 {
            return Err(DetectError::ModelShape(format!(
                "expected 1 input and 1 output, model has {} and {}",
                session.inputs.len(),
                session.outputs.len()
            )));
        }

        let input_dims = tensor_dims(&session.inputs[0].input_type, "input")?;
        let input_shape = validate_input_dims(&input_dims, default_input)?;
        let output_dims = tensor_dims(&session.outputs[0].output_type, "output")?;
        validate_output_dims(&output_dims)?;
        let output_name = session.outputs[0].name.clone();

        debug!(
            input = ?input_dims,
            output = ?output_dims,
            output_name = %output_name,
            "model tensor shapes"
        );
        info!(
            "model loaded, input {}x{}",
            input_shape.width, input_shape.height
        );

        Ok(OrtInferenceSession {
            session,
            output_name,
            input_shape,
        })
    }
}

fn tensor_dims(value_type: &ValueType, which: &str) -> Result<Vec<i64>> {
    match value_type {
        ValueType::Tensor { shape, .. } => Ok(shape.iter().copied().collect()),
        other => Err(DetectError::ModelShape(format!(
            "model {} is not a tensor: {:?}",
            which, other
        ))),
    }
}

/// Expects `[1, 3, H, W]`; dynamic (non-positive) batch, height or width are accepted.
fn validate_input_dims(dims: &[i64], default_input: (u32, u32)) -> Result<InputShape> {
    if dims.len() != 4 {
        return Err(DetectError::ModelShape(format!(
            "expected a 4D NCHW input, got {:?}",
            dims
        )));
    }
    if dims[0] > 1 {
        return Err(DetectError::ModelShape(format!(
            "expected batch size 1, got {}",
            dims[0]
        )));
    }
    if dims[1] > 0 && dims[1] != 3 {
        return Err(DetectError::ModelShape(format!(
            "expected 3 input channels, got {}",
            dims[1]
        )));
    }
    let side = |dim: i64, fallback: u32| if dim > 0 { dim as u32 } else { fallback };
    Ok(InputShape {
        width: side(dims[3], default_input.0),
        height: side(dims[2], default_input.1),
        channels: 3,
    })
}

/// Expects `[1, A, B]` (or `[A, B]`) where one of `A`, `B` holds box and class features.
fn validate_output_dims(dims: &[i64]) -> Result<()> {
    let features_and_anchors = match dims {
        [batch, a, b] if *batch <= 1 => (*a, *b),
        [a, b] => (*a, *b),
        _ => {
            return Err(DetectError::ModelShape(format!(
                "expected a [1, features, anchors] output, got {:?}",
                dims
            )));
        }
    };
    match features_and_anchors {
        // Dynamic axes are checked per call in the decoder.
        (a, b) if a <= 0 || b <= 0 => Ok(()),
        (a, b) if a.min(b) < 5 => Err(DetectError::ModelShape(format!(
            "output {:?} has no room for 4 box values plus class scores",
            dims
        ))),
        _ => Ok(()),
    }
}

impl InferenceEngine for OrtInferenceSession {
    fn input_shape(&self) -> InputShape {
        self.input_shape
    }

    fn infer(&mut self, input: &TensorBuffer) -> Result<TensorBuffer> {
        let [channels, height, width] = input.shape();
        let expected = (
            self.input_shape.channels as usize,
            self.input_shape.height as usize,
            self.input_shape.width as usize,
        );
        if (channels, height, width) != expected {
            return Err(DetectError::Inference(format!(
                "input tensor is {}x{}x{}, model expects {}x{}x{}",
                channels, height, width, expected.0, expected.1, expected.2
            )));
        }

        let engine_error = |e: ort::Error| {
            error!(error = %e, "onnxruntime failure");
            DetectError::Inference(e.to_string())
        };
        let shape = [1usize, channels, height, width];
        let tensor = Tensor::from_array((shape, input.data().to_vec().into_boxed_slice()))
            .map_err(engine_error)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(engine_error)?;
        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            DetectError::Inference(format!("model produced no output named {}", self.output_name))
        })?;
        let (output_shape, data) = output.try_extract_tensor::<f32>().map_err(engine_error)?;
        let dims: Vec<usize> = output_shape.iter().map(|&d| d.max(0) as usize).collect();
        debug!(output = ?dims, "inference finished");

        let (rows, columns) = match dims.as_slice() {
            [1, rows, columns] | [rows, columns] => (*rows, *columns),
            other => {
                return Err(DetectError::Inference(format!(
                    "unexpected output shape {:?}",
                    other
                )));
            }
        };
        TensorBuffer::from_vec(columns, rows, 1, data.to_vec())
    }
}
