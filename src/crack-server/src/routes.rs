//! HTTP surface: prediction, liveness and health endpoints.
//!
//! The handlers only move bytes and map errors; all prediction logic lives in
//! `crack-detect`. Pipeline errors are logged once here, at the boundary, and
//! turned into `{"detail": ...}` JSON bodies that never carry a backtrace.

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use crack_detect::{validate_filename, Error, Prediction, ValidationError, MAX_UPLOAD_BYTES};
use log::{error, warn};
use serde::Serialize;
use serde_json::json;

use crate::state::SharedState;

/// Transport-level backstop, sized above the application cap so the
/// pipeline's own size check produces the 413.
const BODY_LIMIT: usize = MAX_UPLOAD_BYTES + 2 * 1024 * 1024;

/// Multipart field carrying the uploaded file.
const IMAGE_FIELD: &str = "image";

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Concrete Crack Detector API is running" }))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
    device: &'static str,
}

async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model_loaded: state.model_loaded(),
        device: state.device_name(),
    })
}

async fn predict(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<Prediction>, ApiError> {
    // The field borrows the multipart stream, so it is consumed right here
    // in the loop; only the owned filename and bytes survive it.
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        // Extension check before the body is read.
        let filename = field.file_name().map(str::to_owned);
        validate_filename(filename.as_deref())?;

        // Enforce the cap while the field streams in, before a full buffer
        // is ever assembled.
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field.chunk().await? {
            if bytes.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(ValidationError::TooLarge.into());
            }
            bytes.extend_from_slice(&chunk);
        }

        upload = Some((filename, bytes));
        break;
    }
    let (filename, bytes) = upload.ok_or(ValidationError::NoFile)?;

    let classifier = state.classifier().await?;

    // The forward pass is CPU-bound and bounded by a timeout so one slow
    // inference cannot wedge the request forever.
    let prediction = tokio::time::timeout(
        state.infer_timeout(),
        tokio::task::spawn_blocking(move || classifier.predict_bytes(filename.as_deref(), &bytes)),
    )
    .await
    .map_err(|_| ApiError::internal("inference timed out"))?
    .map_err(|err| ApiError::internal(format!("inference task failed: {err}")))??;

    Ok(Json(prediction))
}

pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn internal(detail: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let status = match err {
            ValidationError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ValidationError::NoFile | ValidationError::UnsupportedFormat => {
                StatusCode::BAD_REQUEST
            }
        };
        ApiError {
            status,
            detail: err.to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(err) => err.into(),
            Error::ModelLoad(_) => ApiError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                detail: err.to_string(),
            },
            Error::Decode(_) | Error::Inference(_) => ApiError::internal(err.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError {
            status: err.status(),
            detail: err.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("request failed ({}): {}", self.status, self.detail);
        } else {
            warn!("request rejected ({}): {}", self.status, self.detail);
        }

        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
