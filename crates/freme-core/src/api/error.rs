use std::fmt;

use serde::{Deserialize, Serialize};

/// Categories of backend errors for consistent error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// HTTP status error (4xx, 5xx) not covered by a more specific kind
    HttpStatus,
    /// 401 from the backend (missing or rejected credential)
    Unauthorized,
    /// 404 from the backend
    NotFound,
    /// Request did not complete in time
    Timeout,
    /// Connection or I/O failure before a response arrived
    Transport,
    /// Response body could not be decoded
    Parse,
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiErrorKind::HttpStatus => write!(f, "http_status"),
            ApiErrorKind::Unauthorized => write!(f, "unauthorized"),
            ApiErrorKind::NotFound => write!(f, "not_found"),
            ApiErrorKind::Timeout => write!(f, "timeout"),
            ApiErrorKind::Transport => write!(f, "transport"),
            ApiErrorKind::Parse => write!(f, "parse"),
        }
    }
}

/// Structured error from a backend call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// HTTP status, when a response was received
    pub status: Option<u16>,
    /// Raw response body, if any
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            details: None,
        }
    }

    /// Creates an error for a non-success HTTP status.
    ///
    /// The backend answers errors with short plain-text bodies, so a
    /// non-empty single-line body becomes part of the message.
    pub fn http_status(status: u16, body: &str) -> Self {
        let kind = match status {
            401 => ApiErrorKind::Unauthorized,
            404 => ApiErrorKind::NotFound,
            _ => ApiErrorKind::HttpStatus,
        };
        let trimmed = body.trim();
        let message = if trimmed.is_empty() || trimmed.contains('\n') || trimmed.len() > 200 {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {trimmed}")
        };
        Self {
            kind,
            message,
            status: Some(status),
            details: (!trimmed.is_empty()).then(|| body.to_string()),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::Parse, message)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ApiErrorKind::Unauthorized
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::new(ApiErrorKind::Timeout, format!("request timed out: {err}"));
        }
        if err.is_decode() {
            return Self::parse(format!("failed to decode response: {err}"));
        }
        let mut error = Self::new(ApiErrorKind::Transport, format!("request failed: {err}"));
        error.status = err.status().map(|s| s.as_u16());
        error
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

/// Result type for backend calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_maps_kinds() {
        assert_eq!(
            ApiError::http_status(401, "Unauthorized").kind,
            ApiErrorKind::Unauthorized
        );
        assert_eq!(
            ApiError::http_status(404, "Not Found").kind,
            ApiErrorKind::NotFound
        );
        assert_eq!(ApiError::http_status(500, "").kind, ApiErrorKind::HttpStatus);
    }

    #[test]
    fn test_http_status_message_includes_short_body() {
        let err = ApiError::http_status(400, "Invalid connection_id");
        assert_eq!(err.to_string(), "HTTP 400: Invalid connection_id");
        assert_eq!(err.status, Some(400));
        assert_eq!(err.details.as_deref(), Some("Invalid connection_id"));
    }

    #[test]
    fn test_http_status_hides_html_body() {
        let err = ApiError::http_status(500, "<html>\n<body>boom</body>\n</html>");
        assert_eq!(err.to_string(), "HTTP 500");
        assert!(err.details.is_some());
    }
}
