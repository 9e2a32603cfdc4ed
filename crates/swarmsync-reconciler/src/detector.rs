//! Change detection.
//!
//! Decides whether a deployed image is stale relative to its upstream tag.
//! Two strategies exist:
//!
//! - [`DetectionStrategy::ManifestDigest`] asks the registry which manifest
//!   the tag points at and compares it with the deployed digest. Nothing is
//!   pulled.
//! - [`DetectionStrategy::PullAndDiff`] pulls the tag through the
//!   orchestrator and compares the local digests before and after. A
//!   re-tagged image with byte-identical content is not detected.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use swarmsync_core::{Credential, ImageReference};
use swarmsync_registry::{RegistryAuth, RegistryClient, RegistryError};

use crate::error::{ReconcileError, Result};
use crate::orchestrator::{DigestSet, Orchestrator};

/// How staleness is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionStrategy {
    /// Compare the deployed digest with the registry's manifest digest.
    #[default]
    ManifestDigest,

    /// Pull the tag and look for digests that were not present before.
    PullAndDiff,
}

impl fmt::Display for DetectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ManifestDigest => write!(f, "manifest"),
            Self::PullAndDiff => write!(f, "pull"),
        }
    }
}

impl FromStr for DetectionStrategy {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manifest" | "manifest-digest" | "digest" => Ok(Self::ManifestDigest),
            "pull" | "pull-and-diff" => Ok(Self::PullAndDiff),
            other => Err(ReconcileError::InvalidConfig {
                reason: format!("unknown detection strategy '{other}', expected 'manifest' or 'pull'"),
            }),
        }
    }
}

/// Outcome of a staleness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// The deployed image matches upstream.
    Fresh,

    /// Upstream moved on; `image` is the reference to deploy.
    Stale {
        /// New image reference.
        image: ImageReference,
    },
}

/// Resolves the manifest digest a tag currently points at.
#[async_trait]
pub trait ManifestResolver: Send + Sync {
    /// Returns the canonical digest for `image`'s `repository:tag`.
    async fn resolve_digest(
        &self,
        image: &ImageReference,
        credential: Option<&Credential>,
    ) -> std::result::Result<String, RegistryError>;
}

#[async_trait]
impl ManifestResolver for RegistryClient {
    async fn resolve_digest(
        &self,
        image: &ImageReference,
        credential: Option<&Credential>,
    ) -> std::result::Result<String, RegistryError> {
        self.manifest_digest(image, &RegistryAuth::from(credential))
            .await
    }
}

/// Returns true if `after` holds a digest that `before` does not.
///
/// # Examples
///
/// ```
/// use swarmsync_reconciler::{introduces_new, DigestSet};
///
/// let before: DigestSet = ["sha256:a".to_string()].into();
/// let after: DigestSet = ["sha256:a".to_string(), "sha256:b".to_string()].into();
/// assert!(introduces_new(&before, &after));
/// assert!(!introduces_new(&after, &before));
/// ```
pub fn introduces_new(before: &DigestSet, after: &DigestSet) -> bool {
    !after.is_subset(before)
}

/// Runs the configured detection strategy.
#[derive(Clone)]
pub struct ChangeDetector {
    strategy: DetectionStrategy,
    orchestrator: Arc<dyn Orchestrator>,
    resolver: Arc<dyn ManifestResolver>,
}

impl fmt::Debug for ChangeDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeDetector")
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl ChangeDetector {
    /// Creates a detector.
    pub fn new(
        strategy: DetectionStrategy,
        orchestrator: Arc<dyn Orchestrator>,
        resolver: Arc<dyn ManifestResolver>,
    ) -> Self {
        Self {
            strategy,
            orchestrator,
            resolver,
        }
    }

    /// Returns the active strategy.
    pub const fn strategy(&self) -> DetectionStrategy {
        self.strategy
    }

    /// Checks whether `deployed` is stale.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry or orchestrator cannot answer. The
    /// caller skips the service in that case.
    pub async fn detect(
        &self,
        deployed: &ImageReference,
        credential: Option<&Credential>,
    ) -> Result<Staleness> {
        match self.strategy {
            DetectionStrategy::ManifestDigest => self.detect_by_manifest(deployed, credential).await,
            DetectionStrategy::PullAndDiff => self.detect_by_pull(deployed, credential).await,
        }
    }

    async fn detect_by_manifest(
        &self,
        deployed: &ImageReference,
        credential: Option<&Credential>,
    ) -> Result<Staleness> {
        let latest = self
            .resolver
            .resolve_digest(&deployed.without_digest(), credential)
            .await?;

        if deployed.is_pinned_to(&latest) {
            tracing::debug!(image = %deployed, "deployed digest is current");
            return Ok(Staleness::Fresh);
        }

        tracing::debug!(
            image = %deployed,
            deployed_digest = deployed.digest().unwrap_or("none"),
            latest_digest = %latest,
            "manifest digest changed"
        );
        Ok(Staleness::Stale {
            image: deployed.with_digest(latest),
        })
    }

    async fn detect_by_pull(
        &self,
        deployed: &ImageReference,
        credential: Option<&Credential>,
    ) -> Result<Staleness> {
        let target = deployed.without_digest();

        let before = self.orchestrator.image_digests(&target).await?;
        self.orchestrator.pull_image(&target, credential).await?;
        let after = self.orchestrator.image_digests(&target).await?;

        if introduces_new(&before, &after) {
            tracing::debug!(
                image = %target,
                before = before.len(),
                after = after.len(),
                "pull introduced a new digest"
            );
            Ok(Staleness::Stale { image: target })
        } else {
            Ok(Staleness::Fresh)
        }
    }
}
