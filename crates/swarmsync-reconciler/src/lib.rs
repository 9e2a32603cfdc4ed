//! Swarm service reconciler.
//!
//! Keeps Docker Swarm services on the newest content published for their
//! image tags.
//!
//! # Overview
//!
//! - **Change detection**: compares deployed digests with the registry, or
//!   pulls and diffs local digests ([`ChangeDetector`])
//! - **Sweeps**: one pass over every service with a structured report
//!   ([`Reconciler`], [`SweepReport`])
//! - **Driver**: startup sweep, then schedule or interval triggered sweeps
//!   until shutdown ([`Driver`], [`Trigger`])
//! - **Orchestrator boundary**: the [`Orchestrator`] trait and its Docker
//!   Engine implementation ([`DockerEngine`])
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swarmsync_reconciler::{
//!     DockerConfig, DockerEngine, Driver, Orchestrator, Reconciler, ReconcilerConfig, Trigger,
//! };
//! use swarmsync_registry::{RegistryClient, RegistryConfig};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Arc::new(DockerEngine::new(&DockerConfig::default())?);
//! engine.ping().await?;
//!
//! let config = ReconcilerConfig::builder().build()?;
//! let trigger = Trigger::new(config.schedule.clone(), config.poll_interval);
//! let registry = Arc::new(RegistryClient::new(RegistryConfig::new())?);
//! let reconciler = Reconciler::new(config, engine, registry);
//!
//! let (_shutdown, rx) = tokio::sync::watch::channel(false);
//! let sweeps = Driver::new(reconciler, trigger).run(rx).await;
//! println!("ran {sweeps} sweeps");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod detector;
pub mod docker;
pub mod driver;
pub mod error;
pub mod orchestrator;
pub mod sweep;
pub mod trigger;
mod transport;

// Re-export main types at crate root
pub use config::{ReconcilerConfig, DEFAULT_POLL_INTERVAL};
pub use detector::{introduces_new, ChangeDetector, DetectionStrategy, ManifestResolver, Staleness};
pub use docker::{
    DockerConfig, DockerEngine, DEFAULT_API_VERSION, DEFAULT_DOCKER_HOST, DEFAULT_ENGINE_TIMEOUT,
    DEFAULT_PULL_TIMEOUT,
};
pub use driver::{Driver, DriverState};
pub use error::{ReconcileError, Result};
pub use orchestrator::{
    DigestSet, Orchestrator, PruneReport, ServiceRecord, ServiceSpec, UpdateResponse,
};
pub use sweep::{OutcomeKind, Reconciler, ServiceOutcome, SweepReport};
pub use trigger::Trigger;
