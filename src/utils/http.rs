// src/utils/http.rs

//! Outbound HTTP plumbing shared by every source client.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{AppError, Result, UpstreamError, UpstreamErrorKind};
use crate::models::{HttpConfig, ProviderConfig, SourceKind};
use crate::utils::retry::{Attempt, Backoff, BackoffConfig, Outcome};

/// Create a configured asynchronous HTTP client.
///
/// Referer headers are never sent; several sources reject or track them.
pub fn create_async_client(config: &HttpConfig, headers: HeaderMap) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .referer(false);
    if !headers.contains_key(USER_AGENT) {
        builder = builder.user_agent(&config.user_agent);
    }
    Ok(builder.default_headers(headers).build()?)
}

/// Parse configured header pairs on top of a source's defaults.
pub fn merge_headers<'a>(
    mut defaults: HeaderMap,
    overrides: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> Result<HeaderMap> {
    for (name, value) in overrides {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AppError::config(format!("Invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| AppError::config(format!("Invalid value for header '{name}': {e}")))?;
        defaults.insert(name, value);
    }
    Ok(defaults)
}

/// A successful upstream response.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub source: SourceKind,
    pub url: String,
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl Fetched {
    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, UpstreamError> {
        serde_json::from_slice(&self.body).map_err(|e| self.malformed(e))
    }

    /// Malformed-body error pointing at this response.
    pub fn malformed(&self, message: impl std::fmt::Display) -> UpstreamError {
        UpstreamError::malformed(self.source, &self.url, message)
    }
}

/// HTTP access to one source.
///
/// Each call is retried on transient failures through [`Backoff`]. Statuses
/// listed as "missing" come back as `Ok(None)`; every other non-2xx status
/// becomes an [`UpstreamError`].
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    kind: SourceKind,
    client: Client,
    base: Url,
    backoff: Backoff,
}

impl UpstreamClient {
    /// Build the client for `provider`, with `defaults` as the source's own headers.
    pub fn new(
        provider: &ProviderConfig,
        http: &HttpConfig,
        retry: &BackoffConfig,
        defaults: HeaderMap,
    ) -> Result<Self> {
        let headers = merge_headers(defaults, &provider.headers)?;
        Ok(Self {
            kind: provider.kind,
            client: create_async_client(http, headers)?,
            base: provider.base()?,
            backoff: Backoff::new(retry.clone()),
        })
    }

    /// Resolve a path relative to the source's base URL.
    pub fn url(&self, path: &str) -> std::result::Result<Url, UpstreamError> {
        self.base.join(path.trim_start_matches('/')).map_err(|e| {
            UpstreamError::new(
                self.kind,
                format!("{}{}", self.base, path),
                UpstreamErrorKind::Malformed(e.to_string()),
            )
        })
    }

    /// GET `url`, treating 404 as missing.
    pub async fn get(&self, url: Url) -> std::result::Result<Option<Fetched>, UpstreamError> {
        self.get_with(url, HeaderMap::new(), &[StatusCode::NOT_FOUND])
            .await
    }

    /// GET `url` with extra headers and a custom set of "missing" statuses.
    pub async fn get_with(
        &self,
        url: Url,
        headers: HeaderMap,
        missing: &[StatusCode],
    ) -> std::result::Result<Option<Fetched>, UpstreamError> {
        let url = &url;
        let headers = &headers;
        let outcome = self
            .backoff
            .run(move |_| self.attempt(url, headers, missing))
            .await;

        match outcome {
            Outcome::Succeeded(fetched) => Ok(fetched),
            Outcome::GaveUp { attempts, last } => {
                log::warn!("{} gave up on {} after {} attempts", self.kind, url, attempts);
                Err(last)
            }
            Outcome::Aborted(error) => Err(error),
            Outcome::Cancelled => Err(UpstreamError::new(
                self.kind,
                url.as_str(),
                UpstreamErrorKind::Network("request cancelled".into()),
            )),
        }
    }

    async fn attempt(
        &self,
        url: &Url,
        headers: &HeaderMap,
        missing: &[StatusCode],
    ) -> std::result::Result<Attempt<Option<Fetched>, UpstreamError>, UpstreamError> {
        let exchange = async {
            let response = self
                .client
                .get(url.clone())
                .headers(headers.clone())
                .send()
                .await?;
            let status = response.status();
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        let (status, body) = match exchange.await {
            Ok(pair) => pair,
            Err(e) => return Self::retry_or_abort(UpstreamError::transport(self.kind, url.as_str(), &e)),
        };

        if missing.contains(&status) {
            log::debug!("{} has no entry at {} ({})", self.kind, url, status);
            return Ok(Attempt::Ready(None));
        }
        if !status.is_success() {
            let error = UpstreamError::status(
                self.kind,
                url.as_str(),
                status.as_u16(),
                &String::from_utf8_lossy(&body),
            );
            return Self::retry_or_abort(error);
        }

        Ok(Attempt::Ready(Some(Fetched {
            source: self.kind,
            url: url.to_string(),
            status,
            body: body.to_vec(),
        })))
    }

    fn retry_or_abort(
        error: UpstreamError,
    ) -> std::result::Result<Attempt<Option<Fetched>, UpstreamError>, UpstreamError> {
        if error.is_transient() {
            log::debug!("Transient upstream failure: {}", error);
            Ok(Attempt::Retry(error))
        } else {
            Err(error)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::upstream;
    use super::*;
    use std::collections::BTreeMap;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/item"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"a\":1}"))
            .mount(&server)
            .await;

        let client = upstream(SourceKind::Kuro, &server.uri());
        let fetched = client
            .get(client.url("api/item").unwrap())
            .await
            .unwrap()
            .unwrap();
        let value: serde_json::Value = fetched.json().unwrap();
        assert_eq!(value["a"], 1);
    }

    #[tokio::test]
    async fn test_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let client = upstream(SourceKind::Kuro, &server.uri());
        let fetched = client.get(client.url("missing").unwrap()).await.unwrap();
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn test_server_error_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(2)
            .mount(&server)
            .await;

        let client = upstream(SourceKind::Sora, &server.uri());
        let err = client.get(client.url("x").unwrap()).await.unwrap_err();
        assert_eq!(err.source_kind, SourceKind::Sora);
        assert!(err.url.ends_with("/x"));
        assert_eq!(
            err.kind,
            UpstreamErrorKind::Status {
                status: 500,
                body: "boom".into()
            }
        );
    }

    #[tokio::test]
    async fn test_forbidden_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let client = upstream(SourceKind::Sora, &server.uri());
        assert!(client.get(client.url("x").unwrap()).await.is_err());
    }

    #[tokio::test]
    async fn test_configured_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("accept-language", "ko-KR"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let mut provider = ProviderConfig::new(SourceKind::Kuro, server.uri());
        provider.headers = BTreeMap::from([("Accept-Language".to_string(), "ko-KR".to_string())]);
        let client = UpstreamClient::new(
            &provider,
            &HttpConfig::default(),
            &test_support::fast_retry(),
            HeaderMap::new(),
        )
        .unwrap();

        assert!(client.get(client.url("/").unwrap()).await.unwrap().is_some());
    }

    #[test]
    fn test_merge_headers_rejects_invalid() {
        let bad = BTreeMap::from([("bad header".to_string(), "x".to_string())]);
        assert!(merge_headers(HeaderMap::new(), &bad).is_err());
    }
}
