//! Command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use swarmsync_core::{default_credentials_path, Schedule};
use swarmsync_reconciler::{
    DetectionStrategy, DockerConfig, ReconcilerConfig, DEFAULT_API_VERSION, DEFAULT_DOCKER_HOST,
};
use swarmsync_registry::{RegistryConfig, TlsConfig};

/// swarmsync - keep Docker Swarm services on the latest image for their tag
#[derive(Debug, Parser)]
#[command(name = "swarmsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Five-field schedule (minute hour day-of-month month day-of-week),
    /// given as separate arguments or one quoted string. Without it,
    /// services are checked every --interval seconds.
    #[arg(value_name = "SCHEDULE")]
    pub schedule: Vec<String>,

    /// Seconds between sweeps when no schedule is given
    #[arg(long, env = "SWARMSYNC_INTERVAL", default_value = "60")]
    pub interval: u64,

    /// Docker Engine endpoint of a Swarm manager
    #[arg(long, env = "DOCKER_HOST", default_value = DEFAULT_DOCKER_HOST)]
    pub docker_host: String,

    /// Docker Engine API version
    #[arg(long, default_value = DEFAULT_API_VERSION)]
    pub api_version: String,

    /// Docker Engine request timeout in seconds
    #[arg(long, default_value = "30")]
    pub engine_timeout: u64,

    /// Image pull timeout in seconds (pull strategy)
    #[arg(long, default_value = "600")]
    pub pull_timeout: u64,

    /// Registry credential file [default: $DOCKER_CONFIG/config.json or ~/.docker/config.json]
    #[arg(long, env = "SWARMSYNC_CREDENTIALS")]
    pub credentials: Option<PathBuf>,

    /// Change detection: manifest (ask the registry) or pull (pull and compare)
    #[arg(long, env = "SWARMSYNC_STRATEGY", default_value = "manifest")]
    pub strategy: DetectionStrategy,

    /// Do not prune unused images before each sweep
    #[arg(long)]
    pub no_prune: bool,

    /// Registry reached over plain HTTP (repeatable)
    #[arg(long = "insecure-registry", value_name = "HOST")]
    pub insecure_registries: Vec<String>,

    /// CA certificate for registries with a private certificate authority
    #[arg(long, value_name = "PATH")]
    pub registry_ca_cert: Option<PathBuf>,

    /// Skip registry TLS certificate verification
    #[arg(long)]
    pub registry_skip_tls_verify: bool,

    /// Registry request timeout in seconds
    #[arg(long, default_value = "30")]
    pub registry_timeout: u64,
}

impl Cli {
    /// Returns the parsed schedule, if one was given.
    pub fn schedule(&self) -> Option<Schedule> {
        (!self.schedule.is_empty()).then(|| Schedule::parse(&self.schedule))
    }

    /// Builds the reconciler configuration.
    pub fn reconciler_config(&self) -> Result<ReconcilerConfig> {
        let mut builder = ReconcilerConfig::builder()
            .credentials_path(
                self.credentials
                    .clone()
                    .unwrap_or_else(default_credentials_path),
            )
            .strategy(self.strategy)
            .prune(!self.no_prune)
            .poll_interval(Duration::from_secs(self.interval));
        if let Some(schedule) = self.schedule() {
            builder = builder.schedule(schedule);
        }
        Ok(builder.build()?)
    }

    /// Builds the registry client configuration.
    pub fn registry_config(&self) -> RegistryConfig {
        let mut config = self
            .insecure_registries
            .iter()
            .fold(RegistryConfig::new(), |config, host| {
                config.with_insecure_registry(host)
            })
            .with_timeout(Duration::from_secs(self.registry_timeout));
        let mut tls = TlsConfig::new();
        if let Some(ca_cert) = &self.registry_ca_cert {
            tls = tls.with_ca_cert(ca_cert);
        }
        if self.registry_skip_tls_verify {
            tls = tls.insecure();
        }
        if self.registry_ca_cert.is_some() || self.registry_skip_tls_verify {
            config = config.with_tls(tls);
        }
        config
    }

    /// Builds the Docker Engine connection settings.
    pub fn docker_config(&self) -> DockerConfig {
        DockerConfig::new(&self.docker_host)
            .with_api_version(&self.api_version)
            .with_timeout(Duration::from_secs(self.engine_timeout))
            .with_pull_timeout(Duration::from_secs(self.pull_timeout))
    }
}
