// src/api/error_response.rs

//! Route-level error classification.
//!
//! Errors leave the gateway in one of four coarse shapes with a generic body
//! (`{"error": "<code>"}`). The fine-grained cause, upstream URL and response
//! snippet go only into the [`DiagnosticReport`] written to the log.

use std::error::Error as StdError;

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::error::{AppError, UpstreamError};
use crate::services::ProviderFailure;

/// HTTP status and machine-readable code of an error.
pub trait ToHttpStatus {
    fn status_code(&self) -> u16;

    fn error_code(&self) -> &'static str;
}

/// Externally visible error shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    NotFound,
    Unavailable,
    BadRequest,
    #[serde(rename = "internal_error")]
    Internal,
}

impl ToHttpStatus for ErrorClass {
    fn status_code(&self) -> u16 {
        match self {
            ErrorClass::NotFound => 404,
            ErrorClass::Unavailable => 503,
            ErrorClass::BadRequest => 400,
            ErrorClass::Internal => 500,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ErrorClass::NotFound => "not_found",
            ErrorClass::Unavailable => "unavailable",
            ErrorClass::BadRequest => "bad_request",
            ErrorClass::Internal => "internal_error",
        }
    }
}

/// Map an error to its external class.
///
/// Network failures, upstream statuses and malformed bodies are all
/// `Unavailable`. With `unavailable_as_not_found`, an id that every source
/// failed on is reported like one that no source has.
pub fn classify(error: &AppError, unavailable_as_not_found: bool) -> ErrorClass {
    match error {
        AppError::NotFound { .. } => ErrorClass::NotFound,
        AppError::Unavailable { .. } if unavailable_as_not_found => ErrorClass::NotFound,
        AppError::Unavailable { .. } | AppError::Upstream(_) => ErrorClass::Unavailable,
        AppError::Validation(_) => ErrorClass::BadRequest,
        AppError::Config(_)
        | AppError::Io(_)
        | AppError::Http(_)
        | AppError::Json(_)
        | AppError::Toml(_)
        | AppError::Url(_)
        | AppError::Selector { .. } => ErrorClass::Internal,
    }
}

/// Upstream request detail kept for developers.
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamDetail {
    pub source: String,
    pub url: String,
    pub kind: String,
}

impl From<&UpstreamError> for UpstreamDetail {
    fn from(error: &UpstreamError) -> Self {
        Self {
            source: error.source_kind.to_string(),
            url: error.url.clone(),
            kind: error.kind.to_string(),
        }
    }
}

/// Developer-facing description of a failed request.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub class: ErrorClass,
    pub message: String,
    pub causes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<UpstreamDetail>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ProviderFailure>,
    pub request: String,
}

impl DiagnosticReport {
    pub fn new(
        error: &AppError,
        class: ErrorClass,
        request: impl Into<String>,
        failures: Vec<ProviderFailure>,
    ) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        let detail = match error {
            AppError::Upstream(upstream) => Some(UpstreamDetail::from(upstream)),
            _ => None,
        };

        Self {
            class,
            message: error.to_string(),
            causes,
            detail,
            failures,
            request: request.into(),
        }
    }

    /// Write the report to the log; server-side failures at `error` level.
    pub fn log(&self) {
        let rendered = serde_json::to_string(self).unwrap_or_else(|_| self.message.clone());
        match self.class {
            ErrorClass::NotFound | ErrorClass::BadRequest => {
                log::debug!("Request failed: {}", rendered)
            }
            ErrorClass::Unavailable | ErrorClass::Internal => {
                log::error!("Request failed: {}", rendered)
            }
        }
    }
}

/// An error escaping a route handler, with what the classifier needs.
#[derive(Debug)]
pub struct RouteError {
    pub error: AppError,
    pub request: String,
    pub failures: Vec<ProviderFailure>,
    pub unavailable_as_not_found: bool,
    /// `Cache-Control` attached to a not-found answer
    pub not_found_cache: Option<String>,
}

impl RouteError {
    pub fn new(error: AppError, request: impl Into<String>) -> Self {
        Self {
            error,
            request: request.into(),
            failures: Vec::new(),
            unavailable_as_not_found: false,
            not_found_cache: None,
        }
    }

    pub fn with_failures(mut self, failures: Vec<ProviderFailure>) -> Self {
        self.failures = failures;
        self
    }

    pub fn class(&self) -> ErrorClass {
        classify(&self.error, self.unavailable_as_not_found)
    }
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let class = self.class();
        DiagnosticReport::new(&self.error, class, &self.request, self.failures).log();

        let status =
            StatusCode::from_u16(class.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({ "error": class.error_code() }));

        match (class, self.not_found_cache) {
            (ErrorClass::NotFound, Some(cache)) => {
                (status, [(header::CACHE_CONTROL, cache)], body).into_response()
            }
            _ => (status, [(header::CACHE_CONTROL, "no-store".to_string())], body).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamErrorKind;
    use crate::models::SourceKind;

    fn upstream_error() -> AppError {
        UpstreamError::status(SourceKind::Kuro, "https://kuro.test/api/manga/1", 502, "secret body").into()
    }

    #[test]
    fn test_classification() {
        let cases = [
            (AppError::NotFound { id: 1 }, ErrorClass::NotFound),
            (AppError::Unavailable { id: 1, failures: 2 }, ErrorClass::Unavailable),
            (upstream_error(), ErrorClass::Unavailable),
            (
                UpstreamError::new(SourceKind::Sora, "https://sora.test", UpstreamErrorKind::Timeout).into(),
                ErrorClass::Unavailable,
            ),
            (AppError::validation("bad id"), ErrorClass::BadRequest),
            (AppError::config("missing"), ErrorClass::Internal),
        ];
        for (error, expected) in cases {
            assert_eq!(classify(&error, false), expected, "{error}");
        }
    }

    #[test]
    fn test_unavailable_collapse() {
        let error = AppError::Unavailable { id: 1, failures: 3 };
        assert_eq!(classify(&error, true), ErrorClass::NotFound);
        // Listing failures are never collapsed
        assert_eq!(classify(&upstream_error(), true), ErrorClass::Unavailable);
    }

    #[test]
    fn test_status_and_codes() {
        assert_eq!(ErrorClass::NotFound.status_code(), 404);
        assert_eq!(ErrorClass::Unavailable.status_code(), 503);
        assert_eq!(ErrorClass::BadRequest.error_code(), "bad_request");
        assert_eq!(ErrorClass::Internal.error_code(), "internal_error");
    }

    #[test]
    fn test_report_keeps_upstream_detail() {
        let error = upstream_error();
        let report = DiagnosticReport::new(&error, classify(&error, false), "GET /manga/1", Vec::new());
        let detail = report.detail.unwrap();
        assert_eq!(detail.source, "kuro");
        assert!(detail.url.ends_with("/api/manga/1"));
        assert!(detail.kind.contains("secret body"));
        assert_eq!(report.request, "GET /manga/1");
    }

    #[tokio::test]
    async fn test_response_body_is_generic() {
        let response = RouteError::new(upstream_error(), "GET /manga/1").into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(text, r#"{"error":"unavailable"}"#);
        assert!(!text.contains("secret"));
    }
}
