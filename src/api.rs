//! HTTP surface for Rusty Docs.
//!
//! - `POST /documents` (also `/api/documents`) – multipart upload with a `file` part and an
//!   optional `filename` field. The PDF is extracted, chunked, embedded, indexed and, when blob
//!   storage is configured, archived. Responds `{ "message": "PDF file uploaded successfully." }`.
//! - `GET /metrics` – ingestion counters.
//! - `GET /health` – liveness check.
//!
//! Request problems map to `400` with the validation message, or `413` when the body exceeds the
//! upload limit. Every downstream failure maps to `503` with a fixed message; the cause is only
//! logged.

use crate::processing::{IngestionApi, PipelineError, UploadRequest, ValidationError};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

const UPLOAD_SUCCESS: &str = "PDF file uploaded successfully.";
const SERVICE_UNAVAILABLE: &str = "Service temporarily unavailable. Please try again later.";

/// Build the HTTP router exposing the upload API surface.
pub fn create_router<S>(service: Arc<S>, max_upload_bytes: usize) -> Router
where
    S: IngestionApi + 'static,
{
    Router::new()
        .route("/documents", post(upload_document::<S>))
        .route("/api/documents", post(upload_document::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(service)
}

#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
}

/// Ingest one uploaded PDF.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, AppError>
where
    S: IngestionApi,
{
    let upload = decode_upload(multipart).await?;
    tracing::debug!(
        filename = upload.declared_name().unwrap_or_default(),
        bytes = upload.file_bytes.len(),
        "Upload received"
    );
    service.ingest(upload).await?;
    Ok(Json(UploadResponse {
        message: UPLOAD_SUCCESS,
    }))
}

/// Read every multipart field, keeping `file` and `filename` and ignoring the rest.
async fn decode_upload(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadRequest, ValidationError> {
    let mut multipart =
        multipart.map_err(|rejection| ValidationError::MalformedForm(rejection.body_text()))?;

    let mut file: Option<Bytes> = None;
    let mut part_name = None;
    let mut content_type = None;
    let mut filename = None;
    while let Some(field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                part_name = field.file_name().map(str::to_string);
                content_type = field.content_type().map(str::to_string);
                file = Some(field.bytes().await.map_err(form_error)?);
            }
            "filename" => {
                filename = Some(field.text().await.map_err(form_error)?);
            }
            _ => tracing::debug!(field = %name, "Ignoring unknown form field"),
        }
    }

    let file = file.ok_or(ValidationError::MissingFile)?;
    let filename = filename
        .filter(|name| !name.trim().is_empty())
        .or(part_name);
    UploadRequest::new(file, filename, content_type)
}

fn form_error(error: MultipartError) -> ValidationError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ValidationError::PayloadTooLarge
    } else {
        ValidationError::MalformedForm(error.body_text())
    }
}

/// Return the ingestion counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: IngestionApi,
{
    Json(service.metrics_snapshot())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

struct AppError(PipelineError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.0.is_client_error() {
            tracing::warn!(error = %self.0, "Upload rejected");
            let status = match self.0 {
                PipelineError::Validation(ValidationError::PayloadTooLarge) => {
                    StatusCode::PAYLOAD_TOO_LARGE
                }
                _ => StatusCode::BAD_REQUEST,
            };
            let body = Json(json!({ "error": self.0.to_string() }));
            return (status, body).into_response();
        }
        tracing::error!(error = %self.0, "Upload failed");
        let body = Json(json!({ "error": SERVICE_UNAVAILABLE }));
        (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<PipelineError>,
{
    fn from(inner: E) -> Self {
        Self(inner.into())
    }
}
