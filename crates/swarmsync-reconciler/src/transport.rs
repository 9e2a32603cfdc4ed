//! HTTP transport to the Docker Engine.
//!
//! The engine listens either on a TCP address or, on unix hosts, on a local
//! socket. Both carry the same HTTP/1.1 API, so callers build one
//! [`EngineRequest`] and get back the status and the full body.

#[cfg(unix)]
use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::error::{ReconcileError, Result};

/// Header carrying base64 registry credentials for pulls and updates.
const REGISTRY_AUTH_HEADER: &str = "X-Registry-Auth";

/// Where the engine listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Endpoint {
    /// HTTP base URL without a trailing slash.
    Http(String),

    /// Path of a local unix socket.
    #[cfg(unix)]
    Unix(PathBuf),
}

impl Endpoint {
    /// Parses a `DOCKER_HOST` value.
    pub(crate) fn parse(host: &str) -> Result<Self> {
        let host = host.trim();
        let unsupported = |reason: &str| ReconcileError::Startup {
            endpoint: host.to_string(),
            reason: reason.to_string(),
        };

        #[cfg(unix)]
        {
            if let Some(path) = host.strip_prefix("unix://") {
                if path.is_empty() {
                    return Err(unsupported("socket path is empty"));
                }
                return Ok(Self::Unix(PathBuf::from(path)));
            }
        }

        let host = host.trim_end_matches('/');
        let base = if let Some(rest) = host.strip_prefix("tcp://") {
            format!("http://{rest}")
        } else if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else if host.starts_with("npipe://") {
            return Err(unsupported("named pipes are not supported"));
        } else if host.is_empty() {
            return Err(unsupported("endpoint is empty"));
        } else if host.contains("://") {
            return Err(unsupported("unsupported scheme"));
        } else {
            format!("http://{host}")
        };

        let url = url::Url::parse(&base).map_err(|e| unsupported(&e.to_string()))?;
        if url.host_str().is_none() {
            return Err(unsupported("endpoint has no host"));
        }
        Ok(Self::Http(base))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http(base) => f.write_str(base),
            #[cfg(unix)]
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Failure below the engine API: connecting, sending or reading.
#[derive(Debug, Error)]
pub(crate) enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[cfg(unix)]
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[cfg(unix)]
    #[error(transparent)]
    Hyper(#[from] hyper::Error),

    #[cfg(unix)]
    #[error("invalid request: {0}")]
    Request(#[from] http::Error),

    #[cfg(unix)]
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// One engine API call.
#[derive(Debug)]
pub(crate) struct EngineRequest {
    method: Method,
    path: String,
    body: Option<Vec<u8>>,
    registry_auth: Option<String>,
    timeout: Option<Duration>,
}

impl EngineRequest {
    /// Creates a request for `path`, which includes the API version and query.
    pub(crate) const fn new(method: Method, path: String) -> Self {
        Self {
            method,
            path,
            body: None,
            registry_auth: None,
            timeout: None,
        }
    }

    pub(crate) fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }

    pub(crate) fn registry_auth(mut self, header: Option<String>) -> Self {
        self.registry_auth = header;
        self
    }

    /// Overrides the transport's default timeout.
    pub(crate) const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Status and body of an engine response.
#[derive(Debug)]
pub(crate) struct EngineResponse {
    pub(crate) status: StatusCode,
    pub(crate) body: Bytes,
}

impl EngineResponse {
    pub(crate) fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends engine requests over TCP or a unix socket.
#[derive(Debug, Clone)]
pub(crate) struct Transport {
    endpoint: Endpoint,
    http: reqwest::Client,
    timeout: Duration,
}

impl Transport {
    pub(crate) fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(user_agent())
            .build()
            .map_err(|e| ReconcileError::Startup {
                endpoint: endpoint.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            endpoint,
            http,
            timeout,
        })
    }

    pub(crate) const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub(crate) async fn send(
        &self,
        request: EngineRequest,
    ) -> std::result::Result<EngineResponse, TransportError> {
        let timeout = request.timeout.unwrap_or(self.timeout);
        match &self.endpoint {
            Endpoint::Http(base) => self.send_http(base, request, timeout).await,
            #[cfg(unix)]
            Endpoint::Unix(socket) => tokio::time::timeout(timeout, send_unix(socket, request))
                .await
                .map_err(|_| TransportError::Timeout(timeout))?,
        }
    }

    async fn send_http(
        &self,
        base: &str,
        request: EngineRequest,
        timeout: Duration,
    ) -> std::result::Result<EngineResponse, TransportError> {
        let mut builder = self
            .http
            .request(request.method, format!("{base}{}", request.path))
            .timeout(timeout);
        if let Some(header) = request.registry_auth {
            builder = builder.header(REGISTRY_AUTH_HEADER, header);
        }
        if let Some(body) = request.body {
            builder = builder.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        Ok(EngineResponse { status, body })
    }
}

/// Sends one request over a fresh connection to a unix socket.
#[cfg(unix)]
async fn send_unix(
    socket: &std::path::Path,
    request: EngineRequest,
) -> std::result::Result<EngineResponse, TransportError> {
    use http_body_util::{BodyExt, Full};
    use hyper::header::{HOST, USER_AGENT};
    use hyper_util::rt::TokioIo;

    let stream = tokio::net::UnixStream::connect(socket).await?;
    let (mut sender, connection) =
        hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!(error = %e, "engine socket connection closed");
        }
    });

    let mut builder = hyper::Request::builder()
        .method(request.method)
        .uri(request.path)
        .header(HOST, "docker")
        .header(USER_AGENT, user_agent());
    if let Some(header) = request.registry_auth {
        builder = builder.header(REGISTRY_AUTH_HEADER, header);
    }
    let body = match request.body {
        Some(body) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Bytes::from(body)
        }
        None => Bytes::new(),
    };

    let response = sender.send_request(builder.body(Full::new(body))?).await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();
    Ok(EngineResponse { status, body })
}

fn user_agent() -> String {
    format!("swarmsync/{}", env!("CARGO_PKG_VERSION"))
}
