use std::path::PathBuf;
use thiserror::Error;

/// Every failure the detection pipeline can surface.
///
/// `ModelLoad` and `ModelShape` are fatal to pipeline construction. The
/// remaining variants are local to a single `detect`/`annotate` call; the
/// pipeline holds no state that a failed call could leave half-updated, so
/// the caller may retry with the same input or skip it.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("failed to load model {path:?}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("model tensor shapes are incompatible with the pipeline: {0}")]
    ModelShape(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("i/o error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DetectError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DetectError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectError>;
