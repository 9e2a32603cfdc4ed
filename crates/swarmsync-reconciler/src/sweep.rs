//! One reconciliation sweep over every service.
//!
//! A sweep reloads credentials, optionally prunes unused images, lists the
//! services and updates each stale one. Failures that concern a single
//! service never abort the sweep; they become warnings in the
//! [`SweepReport`].

use std::sync::Arc;

use swarmsync_core::{CredentialStore, ImageReference};
use uuid::Uuid;

use crate::config::ReconcilerConfig;
use crate::detector::{ChangeDetector, ManifestResolver, Staleness};
use crate::error::{ReconcileError, Result};
use crate::orchestrator::{Orchestrator, PruneReport, ServiceRecord};

/// What happened to one service during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    /// The deployed image is current.
    Unchanged,

    /// An update was submitted.
    Updated {
        /// Image the service now runs.
        image: ImageReference,
        /// Warnings returned by the orchestrator.
        warnings: Vec<String>,
    },

    /// The service was left alone because of an error.
    Skipped {
        /// Why the service was skipped.
        reason: String,
    },
}

/// Per-service result of a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOutcome {
    /// Service identifier.
    pub service_id: String,

    /// Service name.
    pub service: String,

    /// What happened.
    pub kind: OutcomeKind,
}

impl ServiceOutcome {
    fn new(service: &ServiceRecord, kind: OutcomeKind) -> Self {
        Self {
            service_id: service.id.clone(),
            service: service.name().to_string(),
            kind,
        }
    }

    fn skipped(service: &ServiceRecord, reason: impl Into<String>) -> Self {
        Self::new(
            service,
            OutcomeKind::Skipped {
                reason: reason.into(),
            },
        )
    }
}

/// Structured result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Identifier used to correlate log lines.
    pub sweep_id: String,

    /// Prune result, if pruning ran and succeeded.
    pub prune: Option<PruneReport>,

    /// One outcome per listed service, in listing order.
    pub outcomes: Vec<ServiceOutcome>,

    /// Every warning raised during the sweep, in order.
    pub warnings: Vec<String>,
}

impl SweepReport {
    fn new(sweep_id: String) -> Self {
        Self {
            sweep_id,
            ..Self::default()
        }
    }

    /// Number of services that were updated.
    pub fn updated(&self) -> usize {
        self.count(|k| matches!(k, OutcomeKind::Updated { .. }))
    }

    /// Number of services that were already current.
    pub fn unchanged(&self) -> usize {
        self.count(|k| matches!(k, OutcomeKind::Unchanged))
    }

    /// Number of services skipped because of an error.
    pub fn skipped(&self) -> usize {
        self.count(|k| matches!(k, OutcomeKind::Skipped { .. }))
    }

    fn count(&self, predicate: impl Fn(&OutcomeKind) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.kind)).count()
    }

    fn warn(&mut self, warning: String) {
        tracing::warn!(sweep_id = %self.sweep_id, "{warning}");
        self.warnings.push(warning);
    }

    fn record(&mut self, outcome: ServiceOutcome) {
        match &outcome.kind {
            OutcomeKind::Updated { warnings, .. } => {
                for warning in warnings {
                    self.warn(format!("service '{}': {warning}", outcome.service));
                }
            }
            OutcomeKind::Skipped { reason } => {
                self.warn(format!("service '{}' skipped: {reason}", outcome.service));
            }
            OutcomeKind::Unchanged => {}
        }
        self.outcomes.push(outcome);
    }
}

/// Reconciles running services with their upstream images.
pub struct Reconciler {
    config: ReconcilerConfig,
    orchestrator: Arc<dyn Orchestrator>,
    detector: ChangeDetector,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("detector", &self.detector)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a reconciler.
    pub fn new(
        config: ReconcilerConfig,
        orchestrator: Arc<dyn Orchestrator>,
        resolver: Arc<dyn ManifestResolver>,
    ) -> Self {
        let detector = ChangeDetector::new(config.strategy, Arc::clone(&orchestrator), resolver);
        Self {
            config,
            orchestrator,
            detector,
        }
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Runs one sweep.
    ///
    /// # Errors
    ///
    /// Fails only if the services cannot be listed. Everything else is
    /// reported as a warning in the returned report.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::new(Uuid::now_v7().to_string());
        tracing::debug!(sweep_id = %report.sweep_id, strategy = %self.detector.strategy(), "starting sweep");

        let credentials = self.load_credentials(&mut report);

        if self.config.prune {
            self.prune(&mut report).await;
        }

        let services = self.orchestrator.list_services().await?;
        for service in &services {
            let outcome = self.reconcile_service(service, &credentials).await;
            report.record(outcome);
        }

        tracing::debug!(
            sweep_id = %report.sweep_id,
            services = services.len(),
            updated = report.updated(),
            skipped = report.skipped(),
            "sweep complete"
        );
        Ok(report)
    }

    fn load_credentials(&self, report: &mut SweepReport) -> CredentialStore {
        match CredentialStore::load(&self.config.credentials_path) {
            Ok(store) => store,
            Err(e) => {
                report.warn(format!("continuing without registry credentials: {e}"));
                CredentialStore::new()
            }
        }
    }

    async fn prune(&self, report: &mut SweepReport) {
        let pruned = match self.orchestrator.prune_images().await {
            Ok(pruned) => pruned,
            Err(e) => {
                report.warn(format!("image prune failed: {e}"));
                return;
            }
        };

        for reference in &pruned.untagged {
            tracing::info!(sweep_id = %report.sweep_id, image = %reference, "Untagged image");
        }
        for id in &pruned.deleted {
            tracing::info!(sweep_id = %report.sweep_id, image = %id, "Deleted image");
        }
        if pruned.bytes_reclaimed > 0 {
            tracing::info!(
                sweep_id = %report.sweep_id,
                megabytes = format!("{:.1}", pruned.megabytes_reclaimed()),
                "Space reclaimed"
            );
        }
        report.prune = Some(pruned);
    }

    async fn reconcile_service(
        &self,
        service: &ServiceRecord,
        credentials: &CredentialStore,
    ) -> ServiceOutcome {
        let Some(image) = service.spec.image() else {
            return ServiceOutcome::skipped(service, "spec has no container image");
        };
        let deployed = match ImageReference::parse(image) {
            Ok(deployed) => deployed,
            Err(e) => return ServiceOutcome::skipped(service, e.to_string()),
        };

        let credential = credentials.lookup(deployed.registry());
        let latest = match self.detector.detect(&deployed, credential).await {
            Ok(Staleness::Fresh) => return ServiceOutcome::new(service, OutcomeKind::Unchanged),
            Ok(Staleness::Stale { image }) => image,
            Err(ReconcileError::Registry(e)) if e.is_auth_error() && credential.is_none() => {
                return ServiceOutcome::skipped(
                    service,
                    format!("{e} (no credentials configured for {})", deployed.registry()),
                );
            }
            Err(e) => return ServiceOutcome::skipped(service, e.to_string()),
        };

        let mut spec = service.spec.clone();
        spec.bump_force_update();
        spec.set_image(&latest.to_string());

        match self
            .orchestrator
            .update_service(&service.id, service.version, &spec, credential)
            .await
        {
            Ok(response) => {
                tracing::info!(
                    service = %service.name(),
                    from = %deployed,
                    to = %latest,
                    "Updated service"
                );
                ServiceOutcome::new(
                    service,
                    OutcomeKind::Updated {
                        image: latest,
                        warnings: response.warnings,
                    },
                )
            }
            Err(e) if e.is_conflict() => {
                ServiceOutcome::skipped(service, format!("{e}; retrying next sweep"))
            }
            Err(e) => ServiceOutcome::skipped(service, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> ServiceRecord {
        ServiceRecord::new(
            format!("{name}-id"),
            1,
            crate::orchestrator::ServiceSpec::new(name, "nginx"),
        )
    }

    #[test]
    fn test_report_counts() {
        let mut report = SweepReport::new("s".to_string());
        report.record(ServiceOutcome::new(&record("a"), OutcomeKind::Unchanged));
        report.record(ServiceOutcome::skipped(&record("b"), "registry down"));
        report.record(ServiceOutcome::new(
            &record("c"),
            OutcomeKind::Updated {
                image: ImageReference::parse("nginx:latest@sha256:bbb").unwrap(),
                warnings: vec!["image could not be accessed".to_string()],
            },
        ));

        assert_eq!(report.unchanged(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.updated(), 1);
        assert_eq!(
            report.warnings,
            vec![
                "service 'b' skipped: registry down".to_string(),
                "service 'c': image could not be accessed".to_string(),
            ]
        );
    }

    #[test]
    fn test_outcome_carries_identity() {
        let outcome = ServiceOutcome::skipped(&record("web"), "x");
        assert_eq!(outcome.service_id, "web-id");
        assert_eq!(outcome.service, "web");
    }
}
