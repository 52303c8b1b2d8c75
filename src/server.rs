/// HTTP surface of the service: one prediction route per domain plus an info route.
/// Handlers never answer with an HTTP error status; failures are JSON bodies
/// with an `error` field so clients only ever have to parse one shape.

use std::time::Instant;

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info, warn};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::{ApiError, PredictionError};
use crate::prediction::{self, Prediction};
use crate::state::{AppState, Domain};

pub const ROOT_MESSAGE: &str = "MealMind API running!";
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct ServiceInfo
{
    pub message: &'static str,
    pub food_model: String,
    pub fruit_model: String,
    pub endpoints: [&'static str; 2],
}

pub fn router(state: AppState, body_limit: usize) -> Router
{
    Router::new()
        .route("/", get(service_info))
        .route(Domain::Food.route(), post(predict_food))
        .route(Domain::Fruit.route(), post(predict_fruit))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo>
{
    Json(ServiceInfo {
        message: ROOT_MESSAGE,
        food_model: state.food.model_path.display().to_string(),
        fruit_model: state.fruit.model_path.display().to_string(),
        endpoints: [Domain::Food.route(), Domain::Fruit.route()],
    })
}

async fn predict_food(
        State(state): State<AppState>,
        multipart: Result<Multipart, MultipartRejection>,
    ) -> Result<Json<Prediction>, ApiError>
{
    predict_upload(state, Domain::Food, multipart?).await
}

async fn predict_fruit(
        State(state): State<AppState>,
        multipart: Result<Multipart, MultipartRejection>,
    ) -> Result<Json<Prediction>, ApiError>
{
    predict_upload(state, Domain::Fruit, multipart?).await
}

/// Reads the uploaded file and classifies it with the domain's model.
/// Decoding and inference run on the blocking pool; a panic there surfaces
/// as a failed join instead of taking down the worker.
async fn predict_upload(state: AppState, domain: Domain, mut multipart: Multipart) -> Result<Json<Prediction>, ApiError>
{
    let request_id = Uuid::new_v4();
    let bytes = read_file_field(&mut multipart).await.inspect_err(|e| {
        warn!("[{}] Rejected {} upload: {}", request_id, domain.name(), e);
    })?;

    let classifier = state.classifier(domain).clone();
    let normalization = state.normalization;
    let size = bytes.len();

    let now = Instant::now();
    let result = tokio::task::spawn_blocking(move || {
        prediction::predict(&bytes, classifier.classifier.as_ref(), classifier.labels(), normalization)
    }).await;
    let elapsed = now.elapsed();

    match result
    {
        Ok(Ok(prediction)) => {
            info!("[{}] {} ({} bytes): {:?} at {:.4} in {:?}",
                request_id, domain.name(), size, prediction.label, prediction.confidence, elapsed);
            Ok(Json(prediction))
        },
        Ok(Err(e @ PredictionError::Decode(_))) => {
            warn!("[{}] {} ({} bytes): {}", request_id, domain.name(), size, e);
            Err(e.into())
        },
        Ok(Err(e)) => {
            error!("[{}] {} ({} bytes): {}", request_id, domain.name(), size, e);
            Err(e.into())
        },
        Err(e) => {
            error!("[{}] {} prediction task failed: {}", request_id, domain.name(), e);
            Err(e.into())
        },
    }
}

/// Returns the contents of the first field named `file`, skipping any others.
async fn read_file_field(multipart: &mut Multipart) -> Result<Bytes, ApiError>
{
    while let Some(field) = multipart.next_field().await?
    {
        if field.name() == Some(FILE_FIELD) {
            return Ok(field.bytes().await?);
        }
    }
    Err(ApiError::MissingFile)
}
