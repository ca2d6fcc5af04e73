// webex/client.rs

//! Authenticated HTTP adapter for the Webex API.

use std::sync::Arc;
use std::time::Duration;

use log::*;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, Url};
use serde::Serialize;
use serde_json::Value;

use super::outcome::{ApiFailure, ErrorKind, RequestOutcome};

pub const DEFAULT_BASE_URL: &str = "https://webexapis.com/v1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A request descriptor, independent of any connection.
///
/// `target` is either a path relative to the client base URL
/// (`wholesale/customers`) or an absolute URL, as returned by the API
/// in status links.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub target: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    pub fn put(target: impl Into<String>) -> Self {
        Self::new(Method::PUT, target)
    }

    pub fn delete(target: impl Into<String>) -> Self {
        Self::new(Method::DELETE, target)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn query_pairs<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Attaches a typed JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> RequestOutcome<Self> {
        let value = serde_json::to_value(body).map_err(|e| {
            ApiFailure::new(
                ErrorKind::Serialization,
                format!("could not encode request body: {e}"),
                None,
            )
        })?;
        self.body = Some(value);
        Ok(self)
    }
}

/// The parts of a response the executor cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Connection pool, base URL and bearer token, shared read-only by all workers.
#[derive(Clone)]
pub struct WebexClient {
    http: reqwest::Client,
    base_url: Arc<str>,
    auth_header: HeaderValue,
}

impl std::fmt::Debug for WebexClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebexClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl WebexClient {
    /// Builds a client for `base_url` authenticating with `token`.
    pub fn new(base_url: &str, token: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let mut auth_header = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ClientError::InvalidToken)?;
        auth_header.set_sensitive(true);
        Ok(Self {
            http,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            auth_header,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolves a request target against the base URL.
    pub fn resolve(&self, target: &str) -> Result<Url, url::ParseError> {
        if target.starts_with("http://") || target.starts_with("https://") {
            Url::parse(target)
        } else {
            Url::parse(&format!(
                "{}/{}",
                self.base_url,
                target.trim_start_matches('/')
            ))
        }
    }

    /// Sends one attempt of `request`. Only transport problems are errors;
    /// any HTTP status is returned as a response.
    pub async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ClientError> {
        let url = self
            .resolve(&request.target)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {e}", request.target)))?;
        debug!("{} {}", request.method, url);

        let mut builder = self
            .http
            .request(request.method.clone(), url)
            .header(AUTHORIZATION, self.auth_header.clone())
            .header(CONTENT_TYPE, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(ClientError::Transport)?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.map_err(ClientError::Transport)?;
        trace!("HTTP {status}: {body}");
        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Failure to build a client or to obtain any HTTP response.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("access token contains characters not allowed in an HTTP header")]
    InvalidToken,
    #[error("invalid request url {0}")]
    InvalidUrl(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl From<ClientError> for ApiFailure {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::InvalidToken => {
                ApiFailure::new(ErrorKind::Authentication, err.to_string(), None)
            }
            ClientError::InvalidUrl(message) => ApiFailure::validation(message),
            ClientError::Transport(e) => ApiFailure::network(&e),
        }
    }
}
