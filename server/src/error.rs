use std::fmt::Display;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Error taxonomy of the service.
///
/// Validation failures are raised before any store write; store failures are
/// caught at the call site, logged and surfaced; partial completion marks a
/// compound operation that stopped midway and left a reconciler-visible
/// state. Nothing here is fatal to the process.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("authenticated principal required")]
    Precondition,

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("metadata store failure: {0}")]
    Metadata(String),

    #[error("blob store failure: {0}")]
    Blob(String),

    #[error("operation partially completed: {0}")]
    PartialCompletion(String),
}

impl ServiceError {
    pub fn metadata<E: Display>(e: E) -> Self {
        Self::Metadata(e.to_string())
    }

    pub fn blob<E: Display>(e: E) -> Self {
        Self::Blob(e.to_string())
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Precondition => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Metadata(_) | Self::Blob(_) | Self::PartialCompletion(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        tracing::error!("{self}");
        (self.status(), self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ServiceError::Precondition, StatusCode::UNAUTHORIZED)]
    #[case(ServiceError::validation("too big"), StatusCode::UNPROCESSABLE_ENTITY)]
    #[case(ServiceError::not_found("no such record"), StatusCode::NOT_FOUND)]
    #[case(ServiceError::Metadata("locked".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(ServiceError::Blob("gone".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn status_mapping(#[case] error: ServiceError, #[case] expected: StatusCode) {
        // Arrange

        // Act
        let status = error.status();

        // Assert
        assert_eq!(status, expected);
    }
}
