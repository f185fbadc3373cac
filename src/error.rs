use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("camera unavailable: {0}")]
    Camera(String),

    #[error("failed to load model {path}: {source}")]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: ort::OrtError,
    },

    #[error("inference failed: {0}")]
    Inference(#[from] ort::OrtError),

    #[error("tensor shape mismatch: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("unexpected model output: {0}")]
    ModelOutput(String),

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
