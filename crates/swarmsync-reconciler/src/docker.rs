//! Docker Engine API client.
//!
//! Implements [`Orchestrator`] for a Swarm manager reachable over a local
//! unix socket or TCP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use swarmsync_core::{normalize_host, Credential, ImageReference};
use url::form_urlencoded;

use crate::error::{ReconcileError, Result};
use crate::orchestrator::{
    DigestSet, Orchestrator, PruneReport, ServiceRecord, ServiceSpec, UpdateResponse,
};
use crate::transport::{EngineRequest, EngineResponse, Endpoint, Transport};

/// Engine endpoint used when none is configured.
pub const DEFAULT_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// Engine API version prefix used when none is configured.
pub const DEFAULT_API_VERSION: &str = "v1.41";

/// Default timeout for ordinary API calls.
pub const DEFAULT_ENGINE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for image pulls.
pub const DEFAULT_PULL_TIMEOUT: Duration = Duration::from_secs(600);

/// Message the engine returns when a service version token is stale.
const OUT_OF_SEQUENCE: &str = "update out of sequence";

/// Connection settings for the Docker Engine.
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Engine endpoint (`unix://`, `tcp://`, `http://` or `https://`).
    pub host: String,

    /// API version prefix, e.g. `v1.41`.
    pub api_version: String,

    /// Timeout for ordinary API calls.
    pub timeout: Duration,

    /// Timeout for image pulls.
    pub pull_timeout: Duration,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DOCKER_HOST)
    }
}

impl DockerConfig {
    /// Creates a configuration for `host` with default timeouts.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            timeout: DEFAULT_ENGINE_TIMEOUT,
            pull_timeout: DEFAULT_PULL_TIMEOUT,
        }
    }

    /// Sets the API version prefix.
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// Sets the timeout for ordinary API calls.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the timeout for image pulls.
    #[must_use]
    pub const fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }
}

/// Docker Engine API client.
#[derive(Debug, Clone)]
pub struct DockerEngine {
    transport: Transport,
    api_version: String,
    pull_timeout: Duration,
}

impl DockerEngine {
    /// Creates a client for the configured engine. No connection is made
    /// until the first call.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Startup`] if the endpoint is malformed or
    /// uses an unsupported scheme.
    ///
    /// # Examples
    ///
    /// ```
    /// use swarmsync_reconciler::{DockerConfig, DockerEngine};
    ///
    /// let engine = DockerEngine::new(&DockerConfig::default()).unwrap();
    /// assert_eq!(engine.endpoint(), "unix:///var/run/docker.sock");
    ///
    /// let engine = DockerEngine::new(&DockerConfig::new("tcp://10.0.0.1:2375")).unwrap();
    /// assert_eq!(engine.endpoint(), "http://10.0.0.1:2375");
    ///
    /// assert!(DockerEngine::new(&DockerConfig::new("ssh://manager")).is_err());
    /// ```
    pub fn new(config: &DockerConfig) -> Result<Self> {
        let endpoint = Endpoint::parse(&config.host)?;
        Ok(Self {
            transport: Transport::new(endpoint, config.timeout)?,
            api_version: config.api_version.trim_matches('/').to_string(),
            pull_timeout: config.pull_timeout,
        })
    }

    /// Returns the engine endpoint.
    pub fn endpoint(&self) -> String {
        self.transport.endpoint().to_string()
    }

    fn request(&self, method: Method, path: &str) -> EngineRequest {
        EngineRequest::new(method, format!("/{}{path}", self.api_version))
    }

    fn registry_auth(credential: Option<&Credential>) -> Result<Option<String>> {
        Ok(credential.map(Credential::to_registry_auth).transpose()?)
    }

    /// Extracts the engine's error message from a failed response.
    fn error_message(response: &EngineResponse) -> String {
        let body = response.text();
        serde_json::from_str::<EngineError>(&body)
            .map(|e| e.message)
            .ok()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    response.status.to_string()
                } else {
                    body.trim().to_string()
                }
            })
    }
}

#[async_trait]
impl Orchestrator for DockerEngine {
    async fn ping(&self) -> Result<()> {
        let startup = |reason: String| ReconcileError::Startup {
            endpoint: self.endpoint(),
            reason,
        };

        let response = self
            .transport
            .send(self.request(Method::GET, "/version"))
            .await
            .map_err(|e| startup(e.to_string()))?;
        if !response.status.is_success() {
            return Err(startup(Self::error_message(&response)));
        }

        let version: EngineVersion = serde_json::from_slice(&response.body)
            .map_err(|e| startup(format!("unexpected /version response: {e}")))?;
        tracing::info!(
            endpoint = %self.endpoint(),
            version = %version.version,
            api_version = %version.api_version,
            "Connected to Docker Engine"
        );
        Ok(())
    }

    async fn list_services(&self) -> Result<Vec<ServiceRecord>> {
        const OPERATION: &str = "list services";

        let response = self
            .transport
            .send(self.request(Method::GET, "/services"))
            .await
            .map_err(|e| ReconcileError::orchestrator(OPERATION, e))?;
        if !response.status.is_success() {
            return Err(ReconcileError::orchestrator(
                OPERATION,
                Self::error_message(&response),
            ));
        }

        let services: Vec<EngineService> = serde_json::from_slice(&response.body)
            .map_err(|e| ReconcileError::orchestrator(OPERATION, e))?;
        Ok(services.into_iter().map(Into::into).collect())
    }

    async fn update_service(
        &self,
        id: &str,
        version: u64,
        spec: &ServiceSpec,
        auth: Option<&Credential>,
    ) -> Result<UpdateResponse> {
        const OPERATION: &str = "update service";

        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("version", &version.to_string())
            .finish();
        let request = self
            .request(Method::POST, &format!("/services/{id}/update?{query}"))
            .json(spec)?
            .registry_auth(Self::registry_auth(auth)?);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| ReconcileError::orchestrator(OPERATION, e))?;
        if !response.status.is_success() {
            let message = Self::error_message(&response);
            if is_version_conflict(response.status, &message) {
                return Err(ReconcileError::VersionConflict {
                    service: id.to_string(),
                    message,
                });
            }
            return Err(ReconcileError::orchestrator(
                OPERATION,
                format!("{}: {message}", response.status),
            ));
        }

        if response.text().trim().is_empty() {
            return Ok(UpdateResponse::default());
        }
        let reply: EngineUpdateResponse = serde_json::from_slice(&response.body)?;
        Ok(UpdateResponse {
            warnings: reply.warnings.unwrap_or_default(),
        })
    }

    async fn prune_images(&self) -> Result<PruneReport> {
        const OPERATION: &str = "prune images";

        let response = self
            .transport
            .send(self.request(Method::POST, "/images/prune"))
            .await
            .map_err(|e| ReconcileError::orchestrator(OPERATION, e))?;
        if !response.status.is_success() {
            return Err(ReconcileError::orchestrator(
                OPERATION,
                Self::error_message(&response),
            ));
        }

        let reply: EnginePruneResponse = serde_json::from_slice(&response.body)
            .map_err(|e| ReconcileError::orchestrator(OPERATION, e))?;
        Ok(reply.into())
    }

    async fn pull_image(&self, image: &ImageReference, auth: Option<&Credential>) -> Result<()> {
        let failed = |message: String| ReconcileError::PullFailed {
            image: image.name_with_tag(),
            message,
        };

        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("fromImage", &image.name())
            .append_pair("tag", image.tag())
            .finish();
        let request = self
            .request(Method::POST, &format!("/images/create?{query}"))
            .registry_auth(Self::registry_auth(auth)?)
            .timeout(self.pull_timeout);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| failed(e.to_string()))?;
        if !response.status.is_success() {
            return Err(failed(Self::error_message(&response)));
        }

        // The engine reports failures inside a 200 progress stream.
        if let Some(message) = pull_stream_error(&response.text()) {
            return Err(failed(message));
        }

        tracing::debug!(image = %image.name_with_tag(), "pulled image");
        Ok(())
    }

    async fn image_digests(&self, image: &ImageReference) -> Result<DigestSet> {
        let failed = |message: String| ReconcileError::InspectFailed {
            image: image.name_with_tag(),
            message,
        };

        let path = format!("/images/{}/json", image.name_with_tag());
        let response = self
            .transport
            .send(self.request(Method::GET, &path))
            .await
            .map_err(|e| failed(e.to_string()))?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(DigestSet::new());
        }
        if !response.status.is_success() {
            return Err(failed(Self::error_message(&response)));
        }

        let inspect: EngineImage =
            serde_json::from_slice(&response.body).map_err(|e| failed(e.to_string()))?;
        Ok(matching_digests(
            image,
            inspect.repo_digests.as_deref().unwrap_or_default(),
        ))
    }
}

/// Returns true if a failed update was rejected for a stale version token.
fn is_version_conflict(status: StatusCode, message: &str) -> bool {
    status == StatusCode::CONFLICT || message.to_ascii_lowercase().contains(OUT_OF_SEQUENCE)
}

/// Returns the first error reported in a pull progress stream.
///
/// Each line is a JSON object. Only `error` and `errorDetail` count; status
/// text is informational.
fn pull_stream_error(stream: &str) -> Option<String> {
    stream
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .find_map(|event| {
            event
                .get("error")
                .and_then(Value::as_str)
                .or_else(|| event.pointer("/errorDetail/message").and_then(Value::as_str))
                .map(ToString::to_string)
        })
}

/// Selects the `RepoDigests` entries that belong to `image`'s repository.
fn matching_digests(image: &ImageReference, repo_digests: &[String]) -> DigestSet {
    let registry = normalize_host(image.registry());
    let repository = image.api_repository();

    repo_digests
        .iter()
        .filter_map(|entry| {
            let (name, digest) = entry.split_once('@')?;
            let candidate = ImageReference::parse(name).ok()?;
            (normalize_host(candidate.registry()) == registry
                && candidate.api_repository() == repository)
                .then(|| digest.to_string())
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct EngineError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EngineVersion {
    #[serde(default)]
    version: String,
    #[serde(default)]
    api_version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EngineService {
    #[serde(rename = "ID")]
    id: String,
    version: EngineObjectVersion,
    spec: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EngineObjectVersion {
    index: u64,
}

impl From<EngineService> for ServiceRecord {
    fn from(service: EngineService) -> Self {
        Self::new(
            service.id,
            service.version.index,
            ServiceSpec::from_value(service.spec),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EngineUpdateResponse {
    #[serde(default)]
    warnings: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnginePruneResponse {
    #[serde(default)]
    images_deleted: Option<Vec<EnginePruneItem>>,
    #[serde(default)]
    space_reclaimed: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnginePruneItem {
    #[serde(default)]
    untagged: Option<String>,
    #[serde(default)]
    deleted: Option<String>,
}

impl From<EnginePruneResponse> for PruneReport {
    fn from(reply: EnginePruneResponse) -> Self {
        let mut report = Self {
            bytes_reclaimed: reply.space_reclaimed,
            ..Self::default()
        };
        for item in reply.images_deleted.unwrap_or_default() {
            report.untagged.extend(item.untagged.filter(|s| !s.is_empty()));
            report.deleted.extend(item.deleted.filter(|s| !s.is_empty()));
        }
        report
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EngineImage {
    #[serde(default)]
    repo_digests: Option<Vec<String>>,
}
