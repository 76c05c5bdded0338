// src/error.rs

//! Unified error handling for the gateway.

use std::fmt;

use thiserror::Error;

use crate::models::{MangaId, SourceKind};

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Maximum number of response body characters kept for diagnostics.
const BODY_SNIPPET_LEN: usize = 256;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A provider call failed (network, deadline, non-2xx, malformed body)
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Every provider either had no data or failed for this id
    #[error("Manga {id} not found in any source")]
    NotFound { id: MangaId },

    /// Every provider failed for this id
    #[error("Manga {id} unavailable: {failures} source(s) failed")]
    Unavailable { id: MangaId, failures: usize },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }
}

/// Failure talking to one provider.
///
/// Carries the request URL and, for status failures, a snippet of the body so
/// the route layer can produce a useful diagnostic report.
#[derive(Error, Debug, Clone)]
#[error("{source_kind} request to {url} failed: {kind}")]
pub struct UpstreamError {
    pub source_kind: SourceKind,
    pub url: String,
    pub kind: UpstreamErrorKind,
}

/// What went wrong with an upstream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// Non-success status that is not the provider's "missing" marker
    Status { status: u16, body: String },
    /// Attempt exceeded its deadline
    Timeout,
    /// Connection or transport failure
    Network(String),
    /// Response arrived but could not be decoded
    Malformed(String),
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, body } if body.is_empty() => write!(f, "HTTP {status}"),
            Self::Status { status, body } => write!(f, "HTTP {status}: {body}"),
            Self::Timeout => write!(f, "deadline exceeded"),
            Self::Network(message) => write!(f, "network error: {message}"),
            Self::Malformed(message) => write!(f, "malformed body: {message}"),
        }
    }
}

impl UpstreamError {
    pub fn new(source_kind: SourceKind, url: impl Into<String>, kind: UpstreamErrorKind) -> Self {
        Self {
            source_kind,
            url: url.into(),
            kind,
        }
    }

    /// Create a status error, keeping only a short snippet of the body.
    pub fn status(source_kind: SourceKind, url: impl Into<String>, status: u16, body: &str) -> Self {
        Self::new(
            source_kind,
            url,
            UpstreamErrorKind::Status {
                status,
                body: snippet(body),
            },
        )
    }

    /// Create a malformed-body error.
    pub fn malformed(
        source_kind: SourceKind,
        url: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        Self::new(source_kind, url, UpstreamErrorKind::Malformed(message.to_string()))
    }

    /// Map a transport error from reqwest.
    pub fn transport(source_kind: SourceKind, url: impl Into<String>, error: &reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            UpstreamErrorKind::Timeout
        } else if error.is_decode() {
            UpstreamErrorKind::Malformed(error.to_string())
        } else {
            UpstreamErrorKind::Network(error.to_string())
        };
        Self::new(source_kind, url, kind)
    }

    /// Whether another attempt at the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match &self.kind {
            UpstreamErrorKind::Status { status, .. } => {
                matches!(status, 408 | 425 | 429 | 500 | 502 | 503 | 504 | 520..=527)
            }
            UpstreamErrorKind::Timeout | UpstreamErrorKind::Network(_) => true,
            UpstreamErrorKind::Malformed(_) => false,
        }
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(BODY_SNIPPET_LEN) {
        Some((end, _)) => format!("{}…", &trimmed[..end]),
        None => trimmed.to_string(),
    }
}
