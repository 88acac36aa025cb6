use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::intake::IntakeError;

pub mod music;

pub type ApiResult<T> = Result<T, ApiError>;
pub type ApiJsonResult<T> = ApiResult<Json<T>>;

/// Every failure a route can report. Component errors are converted into one
/// of these at the handler boundary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error("transcode failed: {0}")]
    Transcode(String),

    #[error("asset '{0}' not found")]
    AssetNotFound(String),

    #[error("variant '{quality}' of '{name}' not found")]
    VariantNotFound { name: String, quality: String },

    #[error("range not satisfiable for {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Intake(IntakeError::UnsupportedMediaType(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ApiError::Intake(IntakeError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Intake(_) => StatusCode::BAD_REQUEST,
            ApiError::Transcode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::AssetNotFound(_) | ApiError::VariantNotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Intake(IntakeError::UnsupportedMediaType(_)) => "UNSUPPORTED_MEDIA_TYPE",
            ApiError::Intake(IntakeError::Io(_)) => "IO_ERROR",
            ApiError::Intake(_) => "BAD_REQUEST",
            ApiError::Transcode(_) => "TRANSCODE_FAILED",
            ApiError::AssetNotFound(_) => "ASSET_NOT_FOUND",
            ApiError::VariantNotFound { .. } => "VARIANT_NOT_FOUND",
            ApiError::RangeNotSatisfiable { .. } => "RANGE_NOT_SATISFIABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // internals stay in the log
            ApiError::Internal(e) => {
                log::error!("ApiError: {:#}", e);
                "internal error".to_string()
            }
            other => {
                log::warn!("ApiError: {}", other);
                other.to_string()
            }
        };

        let body = Json(json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        }));
        let mut response = (status, body).into_response();
        if let ApiError::RangeNotSatisfiable { size } = self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }
        response
    }
}
