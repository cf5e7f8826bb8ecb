// src/errors.rs
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StudioError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("AI service error: {0}")]
    Llm(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Redis error: {0}")]
    Redis(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl StudioError {
    /// Message shown to the user inside a result slice.
    pub fn user_message(&self) -> String {
        match self {
            StudioError::Validation(msg)
            | StudioError::Unauthorized(msg)
            | StudioError::NotFound(msg)
            | StudioError::Llm(msg)
            | StudioError::ImageProcessing(msg)
            | StudioError::Redis(msg)
            | StudioError::Serialization(msg)
            | StudioError::InvalidState(msg) => msg.clone(),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            StudioError::Validation(_) => "Validation error",
            StudioError::Unauthorized(_) => "Unauthorized",
            StudioError::NotFound(_) => "Not found",
            StudioError::Llm(_) => "AI service error",
            StudioError::ImageProcessing(_) => "Image processing error",
            StudioError::Redis(_) => "Database error",
            StudioError::Serialization(_) => "Data processing error",
            StudioError::InvalidState(_) => "Invalid state",
        }
    }
}

impl From<serde_json::Error> for StudioError {
    fn from(e: serde_json::Error) -> Self {
        StudioError::Serialization(e.to_string())
    }
}

impl From<redis::RedisError> for StudioError {
    fn from(e: redis::RedisError) -> Self {
        StudioError::Redis(e.to_string())
    }
}

impl ResponseError for StudioError {
    fn status_code(&self) -> StatusCode {
        match self {
            StudioError::Validation(_) | StudioError::ImageProcessing(_) => {
                StatusCode::BAD_REQUEST
            }
            StudioError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            StudioError::NotFound(_) => StatusCode::NOT_FOUND,
            StudioError::InvalidState(_) => StatusCode::CONFLICT,
            StudioError::Llm(_) => StatusCode::SERVICE_UNAVAILABLE,
            StudioError::Redis(_) | StudioError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.label(),
            "message": self.to_string()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let err = StudioError::Validation("headline missing".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.user_message(), "headline missing");
    }

    #[test]
    fn collaborator_failure_maps_to_service_unavailable() {
        let err = StudioError::Llm("empty response".to_string());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "AI service error: empty response");
    }
}
