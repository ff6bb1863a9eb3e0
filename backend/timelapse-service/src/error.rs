/// Error types for Timelapse Service
///
/// Errors raised before a response is committed are converted to HTTP
/// responses here. Once a streaming response has started, failures are only
/// logged by the session that hit them.
use actix_web::{
    http::{header, StatusCode},
    HttpResponse, ResponseError,
};
use serde::Serialize;
use thiserror::Error;

/// Result type for timelapse-service operations
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("requested range not satisfiable for {total} bytes")]
    RangeNotSatisfiable { total: u64 },

    #[error("encoder failed: {0}")]
    Encoder(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    status: u16,
}

impl AppError {
    fn error_type(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            AppError::Encoder(_) => "encoder_error",
            AppError::Config(_) => "config_error",
            AppError::Io(_) => "server_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            AppError::Encoder(_) | AppError::Config(_) | AppError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let mut builder = HttpResponse::build(status);
        if let AppError::RangeNotSatisfiable { total } = self {
            builder.insert_header((header::CONTENT_RANGE, format!("bytes */{total}")));
        }
        builder.json(ErrorBody {
            error: self.error_type(),
            message: self.to_string(),
            status: status.as_u16(),
        })
    }
}

impl AppError {
    /// Frame source failure reported against a camera. The folder path from
    /// the underlying `FrameSourceError` is logged by the caller only.
    pub fn no_frames_for(camera: &str) -> Self {
        AppError::NotFound(format!("no snapshots for camera '{camera}'"))
    }
}
