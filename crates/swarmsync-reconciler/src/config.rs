//! Configuration types for the reconciler.

use std::path::PathBuf;
use std::time::Duration;

use swarmsync_core::{default_credentials_path, Schedule};

use crate::detector::DetectionStrategy;
use crate::error::{ReconcileError, Result};

/// Interval between sweeps when no schedule is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the reconciler and its driver loop.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Credential file, re-read at the start of every sweep.
    pub credentials_path: PathBuf,

    /// How staleness is detected.
    pub strategy: DetectionStrategy,

    /// Prune unused images before each sweep.
    pub prune: bool,

    /// Sweep trigger schedule. `None` sweeps every `poll_interval`.
    pub schedule: Option<Schedule>,

    /// Interval between sweeps when no schedule is set.
    pub poll_interval: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            strategy: DetectionStrategy::default(),
            prune: true,
            schedule: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ReconcilerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ReconcilerConfigBuilder {
        ReconcilerConfigBuilder::default()
    }
}

/// Builder for `ReconcilerConfig`.
#[derive(Debug, Default)]
pub struct ReconcilerConfigBuilder {
    credentials_path: Option<PathBuf>,
    strategy: Option<DetectionStrategy>,
    prune: Option<bool>,
    schedule: Option<Schedule>,
    poll_interval: Option<Duration>,
}

impl ReconcilerConfigBuilder {
    /// Sets the credential file path.
    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_path = Some(path.into());
        self
    }

    /// Sets the detection strategy.
    pub fn strategy(mut self, strategy: DetectionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Enables or disables image pruning.
    pub fn prune(mut self, enabled: bool) -> Self {
        self.prune = Some(enabled);
        self
    }

    /// Sets the trigger schedule.
    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = Some(schedule);
        self
    }

    /// Sets the fallback poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Builds the configuration.
    ///
    /// An invalid schedule is accepted; it never fires and the driver logs
    /// the parse error on every tick.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::InvalidConfig`] for a zero poll interval.
    pub fn build(self) -> Result<ReconcilerConfig> {
        let defaults = ReconcilerConfig::default();
        let poll_interval = self.poll_interval.unwrap_or(defaults.poll_interval);
        if poll_interval.is_zero() {
            return Err(ReconcileError::InvalidConfig {
                reason: "poll interval must be greater than zero".to_string(),
            });
        }

        Ok(ReconcilerConfig {
            credentials_path: self.credentials_path.unwrap_or(defaults.credentials_path),
            strategy: self.strategy.unwrap_or(defaults.strategy),
            prune: self.prune.unwrap_or(defaults.prune),
            schedule: self.schedule,
            poll_interval,
        })
    }
}
