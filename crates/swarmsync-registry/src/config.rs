//! Configuration types for registry client.

use std::path::PathBuf;
use std::time::Duration;

use swarmsync_core::{normalize_host, Credential, DEFAULT_REGISTRY};

/// API endpoint of the public default registry.
const DEFAULT_REGISTRY_ENDPOINT: &str = "https://registry-1.docker.io";

/// Configuration for the registry client.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Request timeout.
    pub timeout: Duration,

    /// Registries reached over plain HTTP (normalized `host[:port]`).
    pub insecure_registries: Vec<String>,

    /// TLS configuration for private CAs.
    pub tls: Option<TlsConfig>,

    /// User agent string.
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryConfig {
    /// Creates a new registry configuration with default settings.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use swarmsync_registry::RegistryConfig;
    ///
    /// let config = RegistryConfig::new();
    /// assert_eq!(config.timeout, Duration::from_secs(30));
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            insecure_registries: Vec::new(),
            tls: None,
            user_agent: format!("swarmsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Marks a registry as reachable over plain HTTP.
    #[must_use]
    pub fn with_insecure_registry(mut self, host: impl AsRef<str>) -> Self {
        self.insecure_registries.push(normalize_host(host.as_ref()));
        self
    }

    /// Sets the TLS configuration.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Returns the API base URL for a registry host.
    ///
    /// # Examples
    ///
    /// ```
    /// use swarmsync_registry::RegistryConfig;
    ///
    /// let config = RegistryConfig::new().with_insecure_registry("10.0.0.5:5000");
    /// assert_eq!(config.endpoint("docker.io"), "https://registry-1.docker.io");
    /// assert_eq!(config.endpoint("ghcr.io"), "https://ghcr.io");
    /// assert_eq!(config.endpoint("10.0.0.5:5000"), "http://10.0.0.5:5000");
    /// assert_eq!(config.endpoint("localhost:5000"), "http://localhost:5000");
    /// ```
    #[must_use]
    pub fn endpoint(&self, registry: &str) -> String {
        let host = normalize_host(registry);
        if host == DEFAULT_REGISTRY {
            return DEFAULT_REGISTRY_ENDPOINT.to_string();
        }

        let hostname = host.split(':').next().unwrap_or_default();
        let insecure = hostname == "localhost"
            || hostname == "127.0.0.1"
            || self.insecure_registries.iter().any(|h| *h == host);

        if insecure {
            format!("http://{host}")
        } else {
            format!("https://{host}")
        }
    }
}

/// Authentication methods for registry access.
#[derive(Debug, Clone, Default)]
pub enum RegistryAuth {
    /// Anonymous access.
    #[default]
    None,

    /// Basic authentication (username/password or username/token).
    Basic {
        /// Username.
        username: String,
        /// Password or token.
        password: String,
    },

    /// Bearer token authentication.
    Bearer {
        /// Token value.
        token: String,
    },
}

impl RegistryAuth {
    /// Creates basic authentication.
    ///
    /// # Examples
    ///
    /// ```
    /// use swarmsync_registry::RegistryAuth;
    ///
    /// let auth = RegistryAuth::basic("user", "pass");
    /// ```
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates bearer token authentication.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// Returns the username/password pair, if this is basic auth.
    #[must_use]
    pub fn basic_credentials(&self) -> Option<(&str, &str)> {
        match self {
            Self::Basic { username, password } => Some((username.as_str(), password.as_str())),
            Self::None | Self::Bearer { .. } => None,
        }
    }
}

impl From<Option<&Credential>> for RegistryAuth {
    fn from(credential: Option<&Credential>) -> Self {
        credential.map_or(Self::None, |c| Self::basic(&c.username, &c.password))
    }
}

/// TLS configuration for registries with private certificate authorities.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Path to CA certificate file.
    pub ca_cert: Option<PathBuf>,

    /// Whether to skip certificate verification (NOT recommended for production).
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    /// Creates a new TLS configuration with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ca_cert: None,
            insecure_skip_verify: false,
        }
    }

    /// Sets the CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Enables insecure mode (skips certificate verification).
    ///
    /// # Warning
    ///
    /// This should only be used for testing. Never use in production.
    #[must_use]
    pub const fn insecure(mut self) -> Self {
        self.insecure_skip_verify = true;
        self
    }
}
