use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Geometry error: the routing oracle produced an empty or degenerate
    /// route. Reported explicitly so the UI can prompt for a valid
    /// origin/destination instead of showing an empty plan.
    #[error("No route: {0}")]
    NoRoute(String),

    /// A newer planning request began while this one was in flight.
    #[error("Plan request superseded by a newer request")]
    Superseded,

    #[error("External service error: {0}")]
    ExternalServiceError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NoRoute(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Superseded => (StatusCode::CONFLICT, self.to_string()),
            AppError::ExternalServiceError(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
        };

        (status, axum::Json(ErrorResponse { error: message })).into_response()
    }
}
