use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};

use crate::api::response;
use crate::guard::BlockedRedirect;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid URL format")]
    InvalidUrl,

    #[error("Access to internal networks is not allowed")]
    ForbiddenHost,

    #[error("Request timeout")]
    Timeout,

    #[error("Response too large")]
    TooLarge,

    #[error("HTTP {0}")]
    HttpStatus(u16),

    #[error("Response data contains non-serializable content")]
    NonSerializableContent,

    #[error("Network failure: {0}")]
    Network(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Failed to export website: {0}")]
    Export(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

const UNREACHABLE_MARKERS: [&str; 5] = [
    "dns error",
    "enotfound",
    "connection refused",
    "econnrefused",
    "error trying to connect",
];

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidUrl | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ForbiddenHost => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the end user for a failed request.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Network(msg) => {
                let lower = msg.to_lowercase();
                if UNREACHABLE_MARKERS.iter().any(|m| lower.contains(m)) {
                    "Website not found or unreachable".to_string()
                } else if lower.contains("timeout") || lower.contains("timed out") {
                    "Request timed out - website took too long to respond".to_string()
                } else {
                    format!("Failed to fetch website: {}", msg)
                }
            }
            AppError::Timeout => "Request timed out - website took too long to respond".to_string(),
            AppError::TooLarge => "Website content is too large to process".to_string(),
            AppError::HttpStatus(404) => "Website not found (404)".to_string(),
            AppError::HttpStatus(403) => "Access forbidden (403)".to_string(),
            AppError::HttpStatus(500) => "Website server error (500)".to_string(),
            AppError::Export(_) => "Failed to export website".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        response::error(self.status(), self.user_message()).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout
        } else if blocked_redirect(&err) {
            AppError::ForbiddenHost
        } else {
            // The source chain carries the dns/connect detail the user message keys on.
            let mut msg = err.to_string();
            let mut source = std::error::Error::source(&err);
            while let Some(inner) = source {
                msg.push_str(": ");
                msg.push_str(&inner.to_string());
                source = inner.source();
            }
            AppError::Network(msg)
        }
    }
}

fn blocked_redirect(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if inner.is::<BlockedRedirect>() {
            return true;
        }
        source = inner.source();
    }
    false
}

impl From<zip::result::ZipError> for AppError {
    fn from(err: zip::result::ZipError) -> Self {
        AppError::Export(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Export(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
