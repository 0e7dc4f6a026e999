use thiserror::Error;

use crate::utils::truncate_body;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Missing Galaxy credentials: {0}")]
    MissingCredentials(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - gave up after {0} waits")]
    RateLimited(u32),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited(0),
            500..=599 => ApiError::ServerError(format!("Status {}: {}", status, truncated)),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Whether the server policy may retry this failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::ServerError(_) | ApiError::NetworkError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status() {
        assert!(matches!(ApiError::from_status(StatusCode::UNAUTHORIZED, ""), ApiError::Unauthorized));
        assert!(matches!(ApiError::from_status(StatusCode::NOT_FOUND, "gone"), ApiError::NotFound(b) if b == "gone"));
        assert!(matches!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""), ApiError::RateLimited(_)));
        assert!(matches!(ApiError::from_status(StatusCode::BAD_GATEWAY, ""), ApiError::ServerError(_)));
        assert!(matches!(ApiError::from_status(StatusCode::IM_A_TEAPOT, ""), ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_transient() {
        assert!(ApiError::ServerError("x".into()).is_transient());
        assert!(!ApiError::Unauthorized.is_transient());
        assert!(!ApiError::AuthenticationFailed("bad".into()).is_transient());
    }

    #[test]
    fn test_long_body_truncated() {
        let body = "x".repeat(2000);
        let err = ApiError::from_status(StatusCode::FORBIDDEN, &body);
        assert!(err.to_string().len() < 700);
    }
}
