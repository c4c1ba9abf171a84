use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Fallback shown when the server gives no usable `detail`.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("Not authenticated")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Network,
    Server,
    Unauthorized,
    NotFound,
    InvalidResponse,
    Config,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Network(_) => ErrorKind::Network,
            AppError::Server { .. } => ErrorKind::Server,
            AppError::Unauthorized => ErrorKind::Unauthorized,
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::InvalidResponse(_) => ErrorKind::InvalidResponse,
            AppError::Config(_) => ErrorKind::Config,
        }
    }

    /// Builds the error for a non-2xx response from its status and raw body.
    ///
    /// The body is treated as a loose `{ "detail": ... }` envelope; anything
    /// else falls back to [`GENERIC_ERROR_MESSAGE`].
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        if status == StatusCode::UNAUTHORIZED {
            return AppError::Unauthorized;
        }

        AppError::Server {
            status: status.as_u16(),
            message: extract_detail(body).unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::InvalidResponse(err.to_string())
        } else {
            AppError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

fn extract_detail(body: &str) -> Option<String> {
    let envelope: ErrorEnvelope = serde_json::from_str(body).ok()?;
    match envelope.detail? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        serde_json::Value::Null | serde_json::Value::String(_) => None,
        // FastAPI validation errors come back as a list of objects
        other => Some(other.to_string()),
    }
}
