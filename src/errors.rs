//! Error types shared by the store, the logic layer and the HTTP wrapper.

use axum::http::StatusCode;

/// Errors that can occur during data store operations.
///
/// Every variant maps onto exactly one HTTP status so that callers above the store never
/// have to guess how a failure should be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataStoreError {
    /// The record failed struct-level validation.
    Validation(String),
    /// The record would violate a uniqueness constraint.
    Conflict(String),
    /// The operation is not allowed in the record's current state.
    InvalidState(String),
    /// The requested record was not found.
    NotFound(String),
    /// An internal storage error occurred (e.g. a poisoned lock).
    Internal(String),
}

impl DataStoreError {
    /// The HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The human-readable message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(msg)
            | Self::Conflict(msg)
            | Self::InvalidState(msg)
            | Self::NotFound(msg)
            | Self::Internal(msg) => msg,
        }
    }
}

impl std::fmt::Display for DataStoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for DataStoreError {}

/// An error annotated with the HTTP status it should be answered with.
///
/// Produced by the logic layer and the resource handlers; rendered to the wire only by
/// the dispatch wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// The HTTP status code of the response.
    pub status: StatusCode,
    /// The message placed in the `message` field of the error body.
    pub message: String,
}

impl ApiError {
    /// Creates an error with an arbitrary status.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// 400 Bad Request.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// 401 Unauthorized.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    /// 403 Forbidden.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// 404 Not Found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.status.as_u16())
    }
}

impl std::error::Error for ApiError {}

impl From<DataStoreError> for ApiError {
    fn from(e: DataStoreError) -> Self {
        ApiError::new(e.status_code(), e.message())
    }
}
