//! In-memory orchestrator and registry fakes shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use swarmsync_core::{Credential, ImageReference};
use swarmsync_reconciler::{
    DigestSet, ManifestResolver, Orchestrator, PruneReport, ReconcileError, Result,
    ServiceRecord, ServiceSpec, UpdateResponse,
};
use swarmsync_registry::RegistryError;
use tokio::sync::Notify;

/// A submitted update.
#[derive(Debug, Clone)]
pub struct RecordedUpdate {
    pub id: String,
    pub version: u64,
    pub spec: ServiceSpec,
    pub username: Option<String>,
}

#[derive(Debug, Default)]
struct ClusterState {
    services: Vec<ServiceRecord>,
    updates: Vec<RecordedUpdate>,
    conflicts: HashSet<String>,
    update_warnings: Vec<String>,
    prune: Option<PruneReport>,
    list_fails: bool,
    list_calls: usize,
    local_digests: HashMap<String, DigestSet>,
    pull_results: HashMap<String, String>,
    pull_failures: HashSet<String>,
    pulls: Vec<String>,
}

/// Fake cluster that applies accepted updates to its own service list.
#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
    listing_gate: Option<Arc<Notify>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClusterState {
                prune: Some(PruneReport::default()),
                ..ClusterState::default()
            }),
            listing_gate: None,
        }
    }

    /// Holds every listing until `gate` is notified.
    pub fn with_listing_gate(mut self, gate: Arc<Notify>) -> Self {
        self.listing_gate = Some(gate);
        self
    }

    pub fn with_service(self, id: &str, version: u64, image: &str) -> Self {
        self.state
            .lock()
            .services
            .push(ServiceRecord::new(id, version, ServiceSpec::new(id, image)));
        self
    }

    pub fn with_conflict(self, id: &str) -> Self {
        self.state.lock().conflicts.insert(id.to_string());
        self
    }

    pub fn with_update_warning(self, warning: &str) -> Self {
        self.state.lock().update_warnings.push(warning.to_string());
        self
    }

    pub fn with_prune(self, report: Option<PruneReport>) -> Self {
        self.state.lock().prune = report;
        self
    }

    pub fn with_failing_list(self) -> Self {
        self.state.lock().list_fails = true;
        self
    }

    /// Seeds the local image store with a digest for `name:tag`.
    pub fn with_local_digest(self, image: &str, digest: &str) -> Self {
        self.state
            .lock()
            .local_digests
            .entry(image.to_string())
            .or_default()
            .insert(digest.to_string());
        self
    }

    /// Makes a pull of `name:tag` add `digest` to the local store.
    pub fn with_pull_result(self, image: &str, digest: &str) -> Self {
        self.state
            .lock()
            .pull_results
            .insert(image.to_string(), digest.to_string());
        self
    }

    pub fn with_pull_failure(self, image: &str) -> Self {
        self.state.lock().pull_failures.insert(image.to_string());
        self
    }

    pub fn updates(&self) -> Vec<RecordedUpdate> {
        self.state.lock().updates.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    pub fn pulls(&self) -> Vec<String> {
        self.state.lock().pulls.clone()
    }

    pub fn service(&self, id: &str) -> Option<ServiceRecord> {
        self.state.lock().services.iter().find(|s| s.id == id).cloned()
    }
}

#[async_trait]
impl Orchestrator for FakeCluster {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn list_services(&self) -> Result<Vec<ServiceRecord>> {
        if let Some(gate) = &self.listing_gate {
            gate.notified().await;
        }
        let mut state = self.state.lock();
        state.list_calls += 1;
        if state.list_fails {
            return Err(ReconcileError::Orchestrator {
                operation: "list services",
                message: "manager unavailable".to_string(),
            });
        }
        Ok(state.services.clone())
    }

    async fn update_service(
        &self,
        id: &str,
        version: u64,
        spec: &ServiceSpec,
        auth: Option<&Credential>,
    ) -> Result<UpdateResponse> {
        let mut state = self.state.lock();
        if state.conflicts.contains(id) {
            return Err(ReconcileError::VersionConflict {
                service: id.to_string(),
                message: "update out of sequence".to_string(),
            });
        }

        let Some(service) = state.services.iter_mut().find(|s| s.id == id) else {
            return Err(ReconcileError::Orchestrator {
                operation: "update service",
                message: format!("service {id} not found"),
            });
        };
        if service.version != version {
            return Err(ReconcileError::VersionConflict {
                service: id.to_string(),
                message: "update out of sequence".to_string(),
            });
        }
        service.version += 1;
        service.spec = spec.clone();

        state.updates.push(RecordedUpdate {
            id: id.to_string(),
            version,
            spec: spec.clone(),
            username: auth.map(|c| c.username.clone()),
        });
        Ok(UpdateResponse {
            warnings: state.update_warnings.clone(),
        })
    }

    async fn prune_images(&self) -> Result<PruneReport> {
        self.state.lock().prune.clone().ok_or_else(|| ReconcileError::Orchestrator {
            operation: "prune images",
            message: "prune already running".to_string(),
        })
    }

    async fn pull_image(&self, image: &ImageReference, _auth: Option<&Credential>) -> Result<()> {
        let key = image.name_with_tag();
        let mut state = self.state.lock();
        state.pulls.push(key.clone());
        if state.pull_failures.contains(&key) {
            return Err(ReconcileError::PullFailed {
                image: key,
                message: "pull access denied".to_string(),
            });
        }
        if let Some(digest) = state.pull_results.get(&key).cloned() {
            state.local_digests.entry(key).or_default().insert(digest);
        }
        Ok(())
    }

    async fn image_digests(&self, image: &ImageReference) -> Result<DigestSet> {
        Ok(self
            .state
            .lock()
            .local_digests
            .get(&image.name_with_tag())
            .cloned()
            .unwrap_or_default())
    }
}

/// Fake registry keyed by `name:tag`.
#[derive(Debug, Default)]
pub struct FakeRegistry {
    digests: Mutex<HashMap<String, String>>,
    private: Mutex<HashSet<String>>,
    usernames: Mutex<Vec<Option<String>>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_digest(self, image: &str, digest: &str) -> Self {
        self.set_digest(image, digest);
        self
    }

    /// Makes `name:tag` reject anonymous requests.
    pub fn with_private(self, image: &str) -> Self {
        self.private.lock().insert(image.to_string());
        self
    }

    /// Publishes a new digest for `name:tag`.
    pub fn set_digest(&self, image: &str, digest: &str) {
        self.digests
            .lock()
            .insert(image.to_string(), digest.to_string());
    }

    /// Usernames presented on each resolve, in call order.
    pub fn usernames(&self) -> Vec<Option<String>> {
        self.usernames.lock().clone()
    }
}

#[async_trait]
impl ManifestResolver for FakeRegistry {
    async fn resolve_digest(
        &self,
        image: &ImageReference,
        credential: Option<&Credential>,
    ) -> std::result::Result<String, RegistryError> {
        assert!(image.digest().is_none(), "resolver must receive an unpinned reference");
        self.usernames
            .lock()
            .push(credential.map(|c| c.username.clone()));

        if credential.is_none() && self.private.lock().contains(&image.name_with_tag()) {
            return Err(RegistryError::AuthenticationFailed {
                message: format!("{} requires credentials", image.registry()),
            });
        }

        self.digests
            .lock()
            .get(&image.name_with_tag())
            .cloned()
            .ok_or_else(|| RegistryError::NotFound {
                repository: image.api_repository(),
                reference: image.tag().to_string(),
            })
    }
}

/// Writes a credential file with one `host -> username:password` entry each.
pub fn write_credentials(dir: &Path, entries: &[(&str, &str, &str)]) -> PathBuf {
    let auths: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|(host, user, pass)| {
            (
                (*host).to_string(),
                serde_json::json!({ "auth": STANDARD.encode(format!("{user}:{pass}")) }),
            )
        })
        .collect();

    let path = dir.join("config.json");
    std::fs::write(&path, serde_json::json!({ "auths": auths }).to_string())
        .expect("write credential file");
    path
}
