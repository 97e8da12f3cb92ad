use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, RANGE};
use reqwest::redirect::Policy;
use reqwest::{Client, Method};
use thiserror::Error;

use crate::config::HttpSection;

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request to {0} timed out")]
    Timeout(String),
    #[error("connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchMethod {
    Get,
    Head,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: FetchMethod,
    pub headers: Vec<(String, String)>,
    /// Request only the first `n` bytes (`Range: bytes=0-(n-1)`).
    pub range_bytes: Option<u64>,
    /// Stop reading the body after this many bytes.
    pub body_limit: Option<usize>,
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn head() -> Self {
        Self {
            method: FetchMethod::Head,
            headers: Vec::new(),
            range_bytes: None,
            body_limit: Some(0),
            timeout: None,
        }
    }

    pub fn get() -> Self {
        Self {
            method: FetchMethod::Get,
            headers: Vec::new(),
            range_bytes: None,
            body_limit: None,
            timeout: None,
        }
    }

    pub fn ranged(bytes: u64) -> Self {
        let limit = usize::try_from(bytes).unwrap_or(usize::MAX);
        Self {
            method: FetchMethod::Get,
            headers: Vec::new(),
            range_bytes: Some(bytes),
            body_limit: Some(limit),
            timeout: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = Some(limit);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// Lowercased header names.
    pub headers: HashMap<String, String>,
    pub final_url: String,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Minimal HTTP surface the discovery pipeline depends on.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn fetch(&self, url: &str, request: FetchRequest) -> TransportResult<FetchResponse>;
}

/// `reqwest`-backed transport. Redirects are followed up to the configured limit.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    default_timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(config: &HttpSection) -> TransportResult<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(Policy::limited(config.max_redirects))
            .connect_timeout(config.probe_timeout())
            .build()
            .map_err(|err| TransportError::Request {
                url: String::new(),
                reason: err.to_string(),
            })?;
        Ok(Self {
            client,
            default_timeout: config.page_timeout(),
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn fetch(&self, url: &str, request: FetchRequest) -> TransportResult<FetchResponse> {
        let method = match request.method {
            FetchMethod::Get => Method::GET,
            FetchMethod::Head => Method::HEAD,
        };
        let mut builder = self
            .client
            .request(method, url)
            .timeout(request.timeout.unwrap_or(self.default_timeout));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(bytes) = request.range_bytes {
            builder = builder.header(RANGE, format!("bytes=0-{}", bytes.saturating_sub(1)));
        }

        let mut response = builder.send().await.map_err(|err| map_error(url, err))?;
        let status = response.status().as_u16();
        let headers = flatten_headers(response.headers());
        let final_url = response.url().to_string();

        let mut body = Vec::new();
        let limit = request.body_limit.unwrap_or(usize::MAX);
        while body.len() < limit {
            match response.chunk().await.map_err(|err| map_error(url, err))? {
                Some(chunk) => {
                    let remaining = limit - body.len();
                    body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
                }
                None => break,
            }
        }

        Ok(FetchResponse {
            status,
            headers,
            final_url,
            body,
        })
    }
}

fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut flattened = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            flattened
                .entry(name.as_str().to_ascii_lowercase())
                .or_insert_with(|| value.to_string());
        }
    }
    flattened
}

fn map_error(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(url.to_string())
    } else if err.is_connect() {
        TransportError::Connect {
            url: url.to_string(),
            reason: err.to_string(),
        }
    } else {
        TransportError::Request {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}
