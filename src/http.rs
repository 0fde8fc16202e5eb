//! HTTP client with bounded retries, exponential backoff and jitter
//!
//! Every failure that can go away on its own (connection, timeout, redirect
//! loop, undecodable body, non-200 status) is retried with the configured
//! [`BackoffPolicy`]. Once retries run out the caller gets
//! [`FetchError::RetriesExhausted`] and is expected to fall back to whatever
//! data it already holds.
//!
//! # Example
//!
//! ```no_run
//! use symbol_rotator::http::{ClientConfig, FetchRequest, RetryClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = RetryClient::new(ClientConfig::default().with_max_retries(5))?;
//!     let response = client
//!         .fetch(&FetchRequest::get("https://api.bybit.com/v5/market/time"))
//!         .await?;
//!     println!("{}", response.body);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Url};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::common::BackoffPolicy;
use crate::error::FetchError;

/// Timeout applied to every request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Effectively unbounded: the feed is retried until it answers
pub const DEFAULT_MAX_RETRIES: u32 = 10_000;

/// How the response body is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    #[default]
    Json,
    /// Raw body returned as a JSON string
    Text,
}

/// A request description that can be sent any number of times
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: String,
    /// Query parameters, URL-encoded onto `url`
    pub query: Vec<(String, String)>,
    /// Optional JSON body
    pub json: Option<Value>,
    pub format: ResponseFormat,
}

impl FetchRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            json: None,
            format: ResponseFormat::Json,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    pub fn with_format(mut self, format: ResponseFormat) -> Self {
        self.format = format;
        self
    }

    /// URL with the query string applied
    pub fn full_url(&self) -> Result<Url, FetchError> {
        let parsed = if self.query.is_empty() {
            Url::parse(&self.url)
        } else {
            Url::parse_with_params(&self.url, &self.query)
        };
        parsed.map_err(|e| FetchError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })
    }

    fn display_url(&self) -> String {
        self.full_url()
            .map(|u| u.to_string())
            .unwrap_or_else(|_| self.url.clone())
    }
}

/// Successful response: HTTP 200 with a decoded body
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Value,
}

/// One attempt at sending a request, with no retry logic
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

/// [`Transport`] backed by a pooled `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = request.full_url()?;
        let url_str = url.to_string();

        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(body) = &request.json {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_reqwest(&url_str, e))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let text = response
            .text()
            .await
            .map_err(|e| classify_reqwest(&url_str, e))?;

        decode_response(&url_str, status, headers, &text, request.format)
    }
}

/// Map a `reqwest` failure onto the retry taxonomy
fn classify_reqwest(url: &str, err: reqwest::Error) -> FetchError {
    let url = url.to_string();
    if err.is_timeout() {
        FetchError::Timeout { url }
    } else if err.is_redirect() {
        FetchError::Redirect { url }
    } else if err.is_connect() {
        FetchError::Connection {
            url,
            reason: err.to_string(),
        }
    } else if err.is_decode() {
        FetchError::Parse {
            url,
            reason: err.to_string(),
        }
    } else if err.is_builder() {
        FetchError::InvalidUrl {
            url,
            reason: err.to_string(),
        }
    } else {
        FetchError::Request {
            url,
            reason: err.to_string(),
        }
    }
}

/// Turn a raw status and body into a response or a typed error
pub(crate) fn decode_response(
    url: &str,
    status: u16,
    headers: HeaderMap,
    text: &str,
    format: ResponseFormat,
) -> Result<FetchResponse, FetchError> {
    if status != 200 {
        let message = serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|v| {
                v.get("msg")
                    .or_else(|| v.get("message"))
                    .and_then(|m| m.as_str().map(str::to_owned))
            })
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(FetchError::Http {
            url: url.to_string(),
            status,
            message,
        });
    }

    let body = match format {
        ResponseFormat::Text => Value::String(text.to_string()),
        ResponseFormat::Json => serde_json::from_str(text).map_err(|e| FetchError::Parse {
            url: url.to_string(),
            reason: e.to_string(),
        })?,
    };

    Ok(FetchResponse {
        status,
        headers,
        body,
    })
}

/// Retry client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Total attempts before giving up
    pub max_retries: u32,
    /// Per-request timeout
    pub timeout: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Retrying client over any [`Transport`]
#[derive(Debug, Clone)]
pub struct RetryClient<T = HttpTransport> {
    transport: T,
    backoff: BackoffPolicy,
    max_retries: u32,
}

impl RetryClient<HttpTransport> {
    pub fn new(config: ClientConfig) -> reqwest::Result<Self> {
        let transport = HttpTransport::new(config.timeout)?;
        Ok(Self::with_transport(transport, config))
    }
}

impl<T: Transport> RetryClient<T> {
    pub fn with_transport(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            backoff: config.backoff,
            max_retries: config.max_retries.max(1),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Send `request` until it succeeds, a fatal error occurs, or the
    /// attempt budget is spent
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let url = request.display_url();
        let mut attempt = 0u32;

        while attempt < self.max_retries {
            match self.transport.send(request).await {
                Ok(response) => {
                    if attempt > 0 {
                        info!("Request to {} succeeded after {} retries", url, attempt);
                    }
                    return Ok(response);
                }
                Err(e) if !e.is_retryable() => {
                    error!("Request to {} failed permanently: {}", url, e);
                    return Err(e);
                }
                Err(e) => log_failure(&e),
            }

            attempt += 1;
            if attempt >= self.max_retries {
                break;
            }

            let delay = self.backoff.delay(attempt);
            debug!(
                "Retrying {} in {:.2}s (attempt {}/{})",
                url,
                delay.as_secs_f64(),
                attempt + 1,
                self.max_retries
            );
            sleep(delay).await;
        }

        error!(
            "All retries failed for {} after {} attempts",
            url, self.max_retries
        );
        Err(FetchError::RetriesExhausted {
            url,
            attempts: attempt,
        })
    }
}

fn log_failure(err: &FetchError) {
    match err {
        FetchError::Connection { url, reason } => {
            warn!("Connection error on {}: {}", url, reason)
        }
        FetchError::Timeout { url } => warn!("Request timed out for {}", url),
        FetchError::Redirect { url } => warn!("Too many redirects for {}", url),
        FetchError::Parse { url, reason } => warn!("JSON decode error at {}: {}", url, reason),
        FetchError::Http { .. } => warn!("{}", err),
        FetchError::Request { url, reason } => warn!("Request exception at {}: {}", url, reason),
        other => warn!(kind = other.kind(), "{}", other),
    }
}
