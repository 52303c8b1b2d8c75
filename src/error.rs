use std::path::PathBuf;

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// The uploaded bytes could not be decoded as an image.
#[derive(Debug, thiserror::Error)]
#[error("Unable to decode image: {0}")]
pub struct DecodeError(#[from] pub image::ImageError);

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error(transparent)]
    Ort(#[from] ort::Error),
    #[error("Input tensor has shape {actual:?} but the model expects {expected:?}")]
    InputShapeMismatch { expected: Vec<i64>, actual: Vec<usize> },
    #[error("Model produced no output named {0:?}")]
    MissingOutput(String),
    #[error("Classifier returned a non-finite score at index {0}")]
    NonFiniteScore(usize),
    #[error("Classifier returned score {0} outside of [0, 1]")]
    ScoreOutOfRange(f32),
}

#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("Classifier returned {scores} scores but the label table has {labels} entries")]
    Configuration { scores: usize, labels: usize },
}

/// Errors raised while loading a model artifact at startup.
/// None of these are recoverable; the server must not start without both models.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Model file {0:?} does not exist")]
    NotFound(PathBuf),
    #[error("Unable to load model {path:?}: {source}")]
    Ort { path: PathBuf, source: ort::Error },
    #[error("Model {0:?} has no tensor input")]
    NoInput(PathBuf),
    #[error("Model {0:?} has no output")]
    NoOutput(PathBuf),
    #[error("Model {path:?} outputs {outputs} classes but the label table has {labels} entries")]
    LabelMismatch { path: PathBuf, outputs: i64, labels: usize },
}

/// Failures of a prediction request, as seen by the client.
/// Every variant is answered with HTTP 200 and an `{"error": ...}` body;
/// the detailed cause of a prediction failure is logged, not returned.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No file uploaded")]
    MissingFile,
    #[error(transparent)]
    Rejection(#[from] MultipartRejection),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error("Failed to process image.")]
    Prediction(#[from] PredictionError),
    #[error("Failed to process image.")]
    Worker(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        Json(json!({ "error": self.to_string() })).into_response()
    }
}
