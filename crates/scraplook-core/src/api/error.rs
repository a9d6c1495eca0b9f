use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Message used when a failed refresh carries no usable detail
pub const REFRESH_FAILED_MESSAGE: &str = "Failed to refresh access token";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - credentials rejected or token expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Unable to check access token: {status}")]
    CheckFailed { status: StatusCode },

    #[error("{0}")]
    RefreshFailed(String),

    #[error("Session has no refresh token")]
    MissingRefreshToken,

    #[error("Backend issued no refresh token; its /auth/token response must include `refresh_token` to keep the session alive")]
    NoRefreshTokenIssued,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Backend error body: `{"detail": "..."}` or `{"detail": [{"msg": "..."}]}`
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Message(String),
    Items(Vec<ErrorItem>),
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    msg: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Build the error for a rejected refresh, preferring the backend's own
    /// message.
    pub fn refresh_failed(body: &str) -> Self {
        let message = Self::detail_message(body)
            .unwrap_or_else(|| REFRESH_FAILED_MESSAGE.to_string());
        ApiError::RefreshFailed(message)
    }

    /// Extract the human-readable message from a backend error body.
    pub fn detail_message(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        let message = match parsed.detail? {
            ErrorDetail::Message(msg) => Some(msg),
            ErrorDetail::Items(items) => items.into_iter().next()?.msg,
        };
        message.filter(|msg| !msg.is_empty())
    }

    /// Whether the backend rejected the credential itself
    pub fn is_unauthorized(&self) -> bool {
        match self {
            ApiError::Unauthorized => true,
            ApiError::CheckFailed { status } => *status == StatusCode::UNAUTHORIZED,
            _ => false,
        }
    }
}
