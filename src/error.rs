// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Shadow Defective

use thiserror::Error;

/// Result type alias for Shadow Defective operations
pub type Result<T> = std::result::Result<T, ShadowError>;

/// Shadow Defective error types
///
/// Provider failures are rewritten into user-actionable messages. Only
/// `Unclassified` carries the provider's text through verbatim.
#[derive(Error, Debug)]
pub enum ShadowError {
    #[error("{0}")]
    Validation(String),

    #[error("Could not prepare image: {0}")]
    Encoding(#[from] image::ImageError),

    #[error("Authentication failed. Please check your API key.")]
    Authentication,

    #[error("Rate limit or quota exceeded. Wait a moment or check your billing.")]
    RateLimit,

    #[error("Network error. Check your internet connection and try again.")]
    Network,

    #[error("{0}")]
    Unclassified(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShadowError {
    /// Classify a free-form provider message that came without a status code.
    ///
    /// Substring matching is a fallback; callers holding an HTTP status
    /// should use [`ShadowError::from_status`] instead.
    pub fn from_provider_message(message: &str) -> Self {
        let lower = message.to_lowercase();

        if message.contains("401")
            || message.contains("Incorrect API key")
            || message.contains("invalid_api_key")
        {
            Self::Authentication
        } else if message.contains("429") || message.contains("Rate limit") {
            Self::RateLimit
        } else if message.contains("Connection")
            || message.contains("Network")
            || lower.contains("timeout")
        {
            Self::Network
        } else {
            Self::Unclassified(message.to_string())
        }
    }

    /// Classify a non-success HTTP response from the provider
    pub fn from_status(status: reqwest::StatusCode, message: &str) -> Self {
        match status {
            reqwest::StatusCode::UNAUTHORIZED => Self::Authentication,
            reqwest::StatusCode::TOO_MANY_REQUESTS => Self::RateLimit,
            reqwest::StatusCode::REQUEST_TIMEOUT | reqwest::StatusCode::GATEWAY_TIMEOUT => {
                Self::Network
            }
            _ if message.is_empty() => {
                Self::Unclassified(format!("Provider returned status {}", status))
            }
            _ => Self::from_provider_message(message),
        }
    }
}

impl From<reqwest::Error> for ShadowError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            Self::Network
        } else if e.is_body() && has_io_cause(&e) {
            Self::Network
        } else if let Some(status) = e.status() {
            Self::from_status(status, "")
        } else {
            Self::Unclassified(e.to_string())
        }
    }
}

/// Whether a transport error was caused by the socket itself
fn has_io_cause(e: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = e.source();
    while let Some(cause) = source {
        if cause.is::<std::io::Error>() {
            return true;
        }
        source = cause.source();
    }
    false
}
