use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use mediascout_core::discovery::{parse_page_url, FetchRequest, HttpTransport};
use mediascout_core::{DiscoveryError, MediaDiscovery, PageSource};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::AppError;

pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// `/stream` errors answer in plain text, the `/api` routes answer in JSON.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("url param missing")]
    StreamUrlMissing,
    #[error("Error: {0}")]
    StreamUrlInvalid(String),
    #[error("Media not found")]
    MediaNotFound,
    #[error("Error: {0}")]
    Stream(String),
    #[error("Missing URL parameter")]
    ScanUrlMissing,
    #[error("Invalid URL parameter")]
    ScanUrlInvalid(String),
    #[error("Failed to fetch media")]
    Scan(String),
    #[error("Missing url parameter")]
    ProxyUrlMissing,
    #[error("Invalid url parameter")]
    ProxyUrlInvalid(String),
    #[error("Proxy failed")]
    Proxy(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::StreamUrlMissing
            | ServerError::StreamUrlInvalid(_)
            | ServerError::ScanUrlMissing
            | ServerError::ScanUrlInvalid(_)
            | ServerError::ProxyUrlMissing
            | ServerError::ProxyUrlInvalid(_) => StatusCode::BAD_REQUEST,
            ServerError::MediaNotFound => StatusCode::NOT_FOUND,
            ServerError::Stream(_) | ServerError::Scan(_) | ServerError::Proxy(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            ServerError::ScanUrlInvalid(details)
            | ServerError::Scan(details)
            | ServerError::ProxyUrlInvalid(details)
            | ServerError::Proxy(details) => Some(details.clone()),
            _ => None,
        }
    }

    fn is_plain_text(&self) -> bool {
        matches!(
            self,
            ServerError::StreamUrlMissing
                | ServerError::StreamUrlInvalid(_)
                | ServerError::MediaNotFound
                | ServerError::Stream(_)
        )
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!(error = %self, details = ?self.details(), "request failed");
        }
        if self.is_plain_text() {
            return (status, self.to_string()).into_response();
        }
        let body = ErrorBody {
            error: self.to_string(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    discovery: Arc<MediaDiscovery>,
    transport: Arc<dyn HttpTransport>,
    stream_source: PageSource,
}

impl AppState {
    pub fn new(discovery: Arc<MediaDiscovery>) -> Self {
        let transport = discovery.transport();
        let stream_source = discovery.config().server.stream_source;
        Self {
            discovery,
            transport,
            stream_source,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UrlQuery {
    pub url: Option<String>,
}

impl UrlQuery {
    fn target(&self) -> Option<&str> {
        self.url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stream", get(stream))
        .route("/api/stream", get(scan))
        .route("/api/proxy", get(proxy))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `bind` with its port replaced by `port` when one is given.
pub fn resolve_bind(bind: &str, port: Option<&str>) -> crate::Result<SocketAddr> {
    let mut addr: SocketAddr = bind.parse().map_err(|err: std::net::AddrParseError| {
        AppError::Bind {
            value: bind.to_string(),
            reason: err.to_string(),
        }
    })?;
    if let Some(port) = port {
        let port = port.trim().parse::<u16>().map_err(|err| AppError::Bind {
            value: port.to_string(),
            reason: err.to_string(),
        })?;
        addr.set_port(port);
    }
    Ok(addr)
}

async fn health() -> &'static str {
    "ok"
}

async fn stream(State(state): State<AppState>, Query(query): Query<UrlQuery>) -> ServerResult<Response> {
    let target = query.target().ok_or(ServerError::StreamUrlMissing)?;
    match state.discovery.discover_with(target, state.stream_source).await {
        Ok(media) => {
            info!(page = %target, media = %media, "redirecting to media");
            let location = HeaderValue::from_str(&media)
                .map_err(|err| ServerError::Stream(err.to_string()))?;
            Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
        }
        Err(DiscoveryError::NoCandidateFound) => Err(ServerError::MediaNotFound),
        Err(DiscoveryError::Input(reason)) => Err(ServerError::StreamUrlInvalid(reason)),
        Err(err) => Err(ServerError::Stream(err.to_string())),
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanResponse {
    pub media: Vec<String>,
}

async fn scan(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
) -> ServerResult<Json<ScanResponse>> {
    let target = query.target().ok_or(ServerError::ScanUrlMissing)?;
    match state.discovery.scan_with(target, PageSource::Static).await {
        Ok(candidates) => Ok(Json(ScanResponse {
            media: candidates.into_iter().map(|candidate| candidate.url).collect(),
        })),
        Err(DiscoveryError::Input(reason)) => Err(ServerError::ScanUrlInvalid(reason)),
        Err(err) => Err(ServerError::Scan(err.to_string())),
    }
}

async fn proxy(
    State(state): State<AppState>,
    Query(query): Query<UrlQuery>,
    headers: HeaderMap,
) -> ServerResult<Response> {
    let raw = query.target().ok_or(ServerError::ProxyUrlMissing)?;
    let target = parse_page_url(raw).map_err(|err| ServerError::ProxyUrlInvalid(err.to_string()))?;
    let http = &state.discovery.config().http;
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(http.user_agent.as_str());

    let request = FetchRequest::get()
        .header("user-agent", user_agent)
        .header("referer", target.as_str())
        .body_limit(http.proxy_body_limit_bytes)
        .timeout(http.page_timeout());
    let upstream = state
        .transport
        .fetch(target.as_str(), request)
        .await
        .map_err(|err| ServerError::Proxy(err.to_string()))?;

    let status = StatusCode::from_u16(upstream.status)
        .map_err(|err| ServerError::Proxy(err.to_string()))?;
    let content_type = upstream
        .content_type()
        .and_then(|value| HeaderValue::from_str(value).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    Ok((status, [(header::CONTENT_TYPE, content_type)], upstream.body).into_response())
}
