//! Orchestrator boundary.
//!
//! The reconciler talks to the cluster only through the [`Orchestrator`]
//! trait. [`crate::DockerEngine`] implements it against the Docker Engine
//! API; tests substitute in-memory fakes.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use swarmsync_core::{Credential, ImageReference};

use crate::error::Result;

/// Set of content digests known locally for one `repository:tag`.
pub type DigestSet = BTreeSet<String>;

/// Operations the reconciler needs from the cluster orchestrator.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Checks that the orchestrator is reachable.
    async fn ping(&self) -> Result<()>;

    /// Lists every service together with its version token.
    async fn list_services(&self) -> Result<Vec<ServiceRecord>>;

    /// Submits a new spec for a service.
    ///
    /// `version` must be the token observed when the service was listed;
    /// a stale token yields [`crate::ReconcileError::VersionConflict`].
    async fn update_service(
        &self,
        id: &str,
        version: u64,
        spec: &ServiceSpec,
        auth: Option<&Credential>,
    ) -> Result<UpdateResponse>;

    /// Removes unused images.
    async fn prune_images(&self) -> Result<PruneReport>;

    /// Pulls `image` into the local image store.
    async fn pull_image(&self, image: &ImageReference, auth: Option<&Credential>) -> Result<()>;

    /// Returns the digests the local image store associates with `image`.
    ///
    /// A missing local image yields an empty set.
    async fn image_digests(&self, image: &ImageReference) -> Result<DigestSet>;
}

/// A service as listed by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRecord {
    /// Orchestrator-assigned identifier.
    pub id: String,

    /// Version token for compare-and-swap updates.
    pub version: u64,

    /// Full service spec.
    pub spec: ServiceSpec,
}

impl ServiceRecord {
    /// Creates a service record.
    pub fn new(id: impl Into<String>, version: u64, spec: ServiceSpec) -> Self {
        Self {
            id: id.into(),
            version,
            spec,
        }
    }

    /// Returns the service name, falling back to the identifier.
    pub fn name(&self) -> &str {
        self.spec.name().unwrap_or(&self.id)
    }
}

/// A service spec.
///
/// The spec is kept as raw JSON so that fields this crate does not model are
/// sent back to the orchestrator untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceSpec(Value);

impl ServiceSpec {
    /// Builds a minimal spec running `image`.
    ///
    /// # Examples
    ///
    /// ```
    /// use swarmsync_reconciler::ServiceSpec;
    ///
    /// let spec = ServiceSpec::new("web", "nginx:1.25");
    /// assert_eq!(spec.name(), Some("web"));
    /// assert_eq!(spec.image(), Some("nginx:1.25"));
    /// assert_eq!(spec.force_update(), 0);
    /// ```
    pub fn new(name: &str, image: &str) -> Self {
        Self(serde_json::json!({
            "Name": name,
            "TaskTemplate": {
                "ContainerSpec": { "Image": image },
                "ForceUpdate": 0
            }
        }))
    }

    /// Wraps a raw spec.
    pub const fn from_value(value: Value) -> Self {
        Self(value)
    }

    /// Returns the raw spec.
    pub const fn as_value(&self) -> &Value {
        &self.0
    }

    /// Returns the service name.
    pub fn name(&self) -> Option<&str> {
        self.0.get("Name").and_then(Value::as_str)
    }

    /// Returns the container image reference.
    pub fn image(&self) -> Option<&str> {
        self.0
            .pointer("/TaskTemplate/ContainerSpec/Image")
            .and_then(Value::as_str)
    }

    /// Returns the force-update counter.
    pub fn force_update(&self) -> u64 {
        self.0
            .pointer("/TaskTemplate/ForceUpdate")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }

    /// Sets the container image reference.
    pub fn set_image(&mut self, image: &str) {
        let container = object_entry(object_entry(&mut self.0, "TaskTemplate"), "ContainerSpec");
        as_object(container).insert("Image".to_string(), Value::from(image));
    }

    /// Increments the force-update counter and returns the new value.
    ///
    /// The orchestrator redeploys tasks whenever this counter changes, even
    /// if nothing else in the spec did.
    pub fn bump_force_update(&mut self) -> u64 {
        let next = self.force_update().saturating_add(1);
        let template = object_entry(&mut self.0, "TaskTemplate");
        as_object(template).insert("ForceUpdate".to_string(), Value::from(next));
        next
    }
}

/// Returns `value[key]`, creating an empty object there if needed.
fn object_entry<'a>(value: &'a mut Value, key: &str) -> &'a mut Value {
    let entry = as_object(value)
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    entry
}

/// Coerces `value` into an object, replacing non-objects.
fn as_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

/// Orchestrator reply to an accepted service update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResponse {
    /// Non-fatal warnings, e.g. an image the manager could not resolve.
    pub warnings: Vec<String>,
}

/// Result of an image prune.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Image IDs that were deleted.
    pub deleted: Vec<String>,

    /// References that were untagged.
    pub untagged: Vec<String>,

    /// Disk space reclaimed, in bytes.
    pub bytes_reclaimed: u64,
}

impl PruneReport {
    /// Returns the reclaimed space in megabytes.
    #[allow(clippy::cast_precision_loss)]
    pub fn megabytes_reclaimed(&self) -> f64 {
        self.bytes_reclaimed as f64 / 1_000_000.0
    }
}
