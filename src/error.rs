use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {}", message.as_deref().unwrap_or("credential rejected"))]
    Unauthorized { message: Option<String> },

    #[error("Request rejected ({status}): {}", message.as_deref().unwrap_or("no message"))]
    Rejected { status: u16, message: Option<String> },

    #[error("Not found")]
    NotFound,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// Maps a non-success HTTP status plus the optional `{message}` body
    /// onto the error taxonomy.
    pub fn from_status(status: StatusCode, message: Option<String>) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AppError::Unauthorized { message },
            StatusCode::NOT_FOUND => AppError::NotFound,
            s => AppError::Rejected {
                status: s.as_u16(),
                message,
            },
        }
    }

    /// The message the remote service attached to its rejection, if any.
    pub fn service_message(&self) -> Option<&str> {
        match self {
            AppError::Unauthorized { message } | AppError::Rejected { message, .. } => {
                message.as_deref()
            }
            AppError::Validation(msg) => Some(msg),
            _ => None,
        }
    }

    /// String recorded for display; falls back to `fallback` when the
    /// service said nothing useful.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            AppError::NotFound => "Task not found".to_string(),
            AppError::Timeout(_) | AppError::Network(_) => {
                format!("{fallback}: the task service is unreachable")
            }
            other => other
                .service_message()
                .map(str::to_string)
                .unwrap_or_else(|| fallback.to_string()),
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, AppError::Unauthorized { .. })
    }

    /// The service answered with a 4xx: it refused the request, as opposed
    /// to failing or never answering.
    pub fn is_client_rejection(&self) -> bool {
        match self {
            AppError::Unauthorized { .. } | AppError::NotFound => true,
            AppError::Rejected { status, .. } => (400..500).contains(status),
            _ => false,
        }
    }

    /// Transport failures are safe to retry for idempotent requests.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Network(_) | AppError::Timeout(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        error!("database error: {}", e);
        AppError::Storage(e.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        error!("migration error: {}", e);
        AppError::Storage(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AppError::Decode(e.to_string())
        } else {
            AppError::Network(e.to_string())
        }
    }
}
