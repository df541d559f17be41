use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// Gateway errors with appropriate HTTP status codes.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The request cannot be expressed in the dialect of the target model family.
    #[error("{0}")]
    BadRequest(String),

    /// Embeddings model id outside the supported table.
    #[error("Unsupported embedding model id {0}")]
    UnsupportedModel(String),

    /// The backend rejected the composed request body.
    #[error("{0}")]
    Validation(String),

    /// Unexpected backend or translation failure.
    #[error("{0}")]
    Internal(String),
}

impl LlmError {
    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::UnsupportedModel(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type string for the response.
    pub fn error_type(&self) -> &str {
        match self {
            Self::BadRequest(_) | Self::UnsupportedModel(_) | Self::Validation(_) => "invalid_request_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Error response format compatible with OpenAI API.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    message: String,
    r#type: String,
    code: u16,
}

impl IntoResponse for LlmError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = ErrorResponse {
            error: ErrorDetails {
                message: self.to_string(),
                r#type: self.error_type().to_string(),
                code: status.as_u16(),
            },
        };

        (status, Json(error_response)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_status_codes() {
        let cases = [
            (LlmError::BadRequest("bad".into()), StatusCode::BAD_REQUEST),
            (LlmError::UnsupportedModel("m".into()), StatusCode::BAD_REQUEST),
            (LlmError::Validation("invalid body".into()), StatusCode::BAD_REQUEST),
            (LlmError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (error, status) in cases {
            assert_eq!(error.status_code(), status);
        }
    }

    #[test]
    fn unsupported_model_message() {
        let error = LlmError::UnsupportedModel("amazon.titan-embed-g1".into());
        insta::assert_snapshot!(error.to_string(), @"Unsupported embedding model id amazon.titan-embed-g1");
    }
}
