//! HTTP Client Seam
//!
//! The executor talks to the network through [`HttpClient`] so that the
//! workflow state machine can be driven by scripted responses in tests.
//! [`ReqwestHttpClient`] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::HttpMethod;
use crate::config::HttpSettings;

/// A fully prepared request: nothing left to template
#[derive(Clone, Debug)]
pub struct HttpRequest {
    /// HTTP verb
    pub method: HttpMethod,
    /// Absolute URL including query string
    pub url: String,
    /// Header name/value pairs
    pub headers: Vec<(String, String)>,
    /// Serialized body, if any
    pub body: Option<Vec<u8>>,
    /// Per-request deadline
    pub timeout: Duration,
}

/// Raw response as received
#[derive(Clone, Debug)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// `Content-Type` header value
    pub content_type: Option<String>,
    /// Response body
    pub body: Vec<u8>,
}

/// Failures below the HTTP layer
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HttpClientError {
    /// The request deadline passed
    #[error("request timed out")]
    Timeout,
    /// DNS, TLS, connection reset and similar
    #[error("connection failed: {0}")]
    Connection(String),
}

/// Network seam used by the transport executor
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform one request
    ///
    /// Non-2xx statuses are successful sends; only transport-level failures
    /// are errors. Dropping the returned future must abort the request.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError>;
}

/// [`HttpClient`] backed by a shared `reqwest::Client`
#[derive(Clone)]
pub struct ReqwestHttpClient {
    http_client: reqwest::Client,
}

impl ReqwestHttpClient {
    /// Wrap an existing client
    #[must_use]
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Build a client from HTTP settings
    ///
    /// # Errors
    ///
    /// Fails if the TLS backend cannot be initialized.
    pub fn from_settings(settings: &HttpSettings) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(settings.connect_timeout_ms))
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self { http_client })
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Head => reqwest::Method::HEAD,
    }
}

fn classify(err: &reqwest::Error) -> HttpClientError {
    if err.is_timeout() {
        HttpClientError::Timeout
    } else {
        HttpClientError::Connection(err.to_string())
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError> {
        let mut builder = self
            .http_client
            .request(to_reqwest_method(request.method), &request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| classify(&e))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| classify(&e))?.to_vec();

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}
