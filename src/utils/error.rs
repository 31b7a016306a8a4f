use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Error taxonomy for the core (spec §7). Only the outermost HTTP adapter
/// (this `IntoResponse` impl) translates these into status codes; inside
/// the core they are plain `Result` values, never exceptions.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Raised only when every degradation path for an external dependency
    /// has also failed; ordinarily the circuit breaker absorbs this kind
    /// and the caller continues on a degraded path instead of seeing it.
    #[error("external service error ({service}): {message}")]
    ExternalService { service: String, message: String },

    #[error("request cancelled")]
    Cancelled,
}

impl CoreError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let (status, detail) = match &self {
            CoreError::Validation(msg) => {
                tracing::warn!("validation error: {msg}");
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            CoreError::NotFound(msg) => {
                tracing::warn!("not found: {msg}");
                (StatusCode::NOT_FOUND, msg.clone())
            }
            CoreError::Permission(msg) => {
                tracing::warn!("permission denied: {msg}");
                (StatusCode::FORBIDDEN, msg.clone())
            }
            CoreError::Storage(msg) => {
                tracing::error!("storage error: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            CoreError::ExternalService { service, message } => {
                tracing::error!("external service error ({service}): {message}");
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            }
            CoreError::Cancelled => {
                tracing::warn!("request cancelled");
                (StatusCode::from_u16(499).unwrap(), "cancelled".to_string())
            }
        };

        (status, Json(ErrorBody { detail })).into_response()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
