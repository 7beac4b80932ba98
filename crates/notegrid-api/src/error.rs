use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use notegrid_core::{FetchError, SyncError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Reconnect required: {0}")]
    ReconnectRequired(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Too many requests: {0}")]
    TooManyRequests(String, u64),
    #[error("External dependency error: {0}")]
    External(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn reconnect_required(message: impl Into<String>) -> Self {
        Self::ReconnectRequired(message.into())
    }

    pub fn too_many_requests(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::TooManyRequests(message.into(), retry_after_secs)
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::External(message.into())
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::ReconnectRequired(_) => "reconnect_required",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "sync_in_progress",
            Self::TooManyRequests(_, _) => "rate_limited",
            Self::External(_) => "upstream_unavailable",
        }
    }

    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) | Self::ReconnectRequired(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooManyRequests(_, _) => StatusCode::TOO_MANY_REQUESTS,
            Self::External(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<FetchError> for AppError {
    fn from(error: FetchError) -> Self {
        if error.is_reconnect_required() {
            Self::ReconnectRequired(error.to_string())
        } else {
            Self::External(error.to_string())
        }
    }
}

impl From<SyncError> for AppError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::Fetch(error) => error.into(),
            SyncError::CycleInProgress(_) => Self::Conflict(error.to_string()),
            SyncError::EmptyGrid(_) => Self::NotFound(error.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match &self {
            Self::TooManyRequests(_, secs) => Some(*secs),
            _ => None,
        };
        let body = ErrorBody {
            error: self.to_string(),
            code: self.code(),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn sync_errors_map_to_statuses() {
        let auth: AppError = SyncError::Fetch(FetchError::Auth("revoked".to_string())).into();
        assert_eq!(auth.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(auth.code(), "reconnect_required");

        let busy: AppError = SyncError::CycleInProgress("db".to_string()).into();
        assert_eq!(busy.status(), StatusCode::CONFLICT);

        let down: AppError = SyncError::Fetch(FetchError::Transient("502".to_string())).into();
        assert_eq!(down.status(), StatusCode::BAD_GATEWAY);

        let empty: AppError = SyncError::EmptyGrid("db".to_string()).into();
        assert_eq!(empty.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn rate_limited_response_carries_retry_after() {
        let response = AppError::too_many_requests("slow down", 42).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
