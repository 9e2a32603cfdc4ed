//! Registry credentials loaded from a Docker credential file.
//!
//! The file has the shape `{"auths": {"<host>": {"auth": "<base64 user:pass>"}}}`.
//! Entries that cannot be decoded are skipped; a missing credential only
//! means the registry is contacted anonymously.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::image::DEFAULT_REGISTRY;

/// Hosts that all refer to the public default registry.
const DEFAULT_REGISTRY_ALIASES: &[&str] = &[
    "docker.io",
    "index.docker.io",
    "registry-1.docker.io",
    "registry.hub.docker.com",
];

/// A username/password login for one registry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Registry host as written in the credential file.
    pub registry_host: String,
    /// Username.
    pub username: String,
    /// Password or token.
    pub password: String,
}

impl Credential {
    /// Creates a new credential.
    pub fn new(
        registry_host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            registry_host: registry_host.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Encodes the credential as a Docker Engine `X-Registry-Auth` header value.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential cannot be serialized.
    pub fn to_registry_auth(&self) -> Result<String> {
        #[derive(Serialize)]
        struct AuthConfig<'a> {
            username: &'a str,
            password: &'a str,
            serveraddress: &'a str,
        }

        let json = serde_json::to_vec(&AuthConfig {
            username: &self.username,
            password: &self.password,
            serveraddress: &self.registry_host,
        })?;
        Ok(URL_SAFE.encode(json))
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("registry_host", &self.registry_host)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    auths: BTreeMap<String, AuthEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthEntry {
    #[serde(default)]
    auth: Option<String>,
}

/// The set of credentials available for one sweep.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
    credentials: Vec<Credential>,
}

impl CredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from already-decoded credentials.
    pub fn from_credentials(credentials: Vec<Credential>) -> Self {
        Self { credentials }
    }

    /// Loads credentials from a credential file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CredentialFile`] if the file cannot be read and
    /// [`Error::CredentialParse`] if it is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::CredentialFile {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_json(&content)?;
        tracing::debug!(
            path = %path.display(),
            count = store.len(),
            "loaded registry credentials"
        );
        Ok(store)
    }

    /// Parses credentials from credential file contents.
    ///
    /// # Examples
    ///
    /// ```
    /// use swarmsync_core::CredentialStore;
    ///
    /// // "u:p" in base64
    /// let store = CredentialStore::from_json(
    ///     r#"{"auths": {"registry.example.com": {"auth": "dTpw"}}}"#,
    /// ).unwrap();
    /// assert_eq!(store.len(), 1);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::CredentialParse`] if the content is not valid JSON.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: ConfigFile = serde_json::from_str(content)?;

        let credentials = config
            .auths
            .into_iter()
            .filter_map(|(host, entry)| {
                let decoded = entry.auth.as_deref().and_then(decode_auth);
                if decoded.is_none() {
                    tracing::debug!(host = %host, "skipping undecodable credential entry");
                }
                decoded.map(|(username, password)| Credential {
                    registry_host: host,
                    username,
                    password,
                })
            })
            .collect();

        Ok(Self { credentials })
    }

    /// Returns the number of credentials.
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Returns true if the store holds no credentials.
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Iterates over all credentials.
    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.credentials.iter()
    }

    /// Finds the credential for a registry host.
    ///
    /// Both sides are normalized with [`normalize_host`]. An exact match wins;
    /// otherwise the longest credential host sharing a host-boundary prefix
    /// with `registry` (for example `registry.example.com` and
    /// `registry.example.com:5000`) is used.
    ///
    /// ```
    /// use swarmsync_core::{Credential, CredentialStore};
    ///
    /// let store = CredentialStore::from_credentials(vec![
    ///     Credential::new("https://index.docker.io/v1/", "hub", "secret"),
    ///     Credential::new("registry.example.com:5000", "corp", "secret"),
    /// ]);
    /// assert_eq!(store.lookup("docker.io").unwrap().username, "hub");
    /// assert_eq!(store.lookup("registry.example.com").unwrap().username, "corp");
    /// assert!(store.lookup("example.com").is_none());
    /// ```
    pub fn lookup(&self, registry: &str) -> Option<&Credential> {
        let wanted = normalize_host(registry);

        let normalized: Vec<(String, &Credential)> = self
            .credentials
            .iter()
            .map(|c| (normalize_host(&c.registry_host), c))
            .collect();

        if let Some((_, credential)) = normalized.iter().find(|(host, _)| *host == wanted) {
            return Some(credential);
        }

        normalized
            .iter()
            .filter(|(host, _)| shares_host_prefix(host, &wanted))
            .max_by_key(|(host, _)| host.len())
            .map(|(_, credential)| *credential)
    }
}

/// Normalizes a registry host to a canonical `host[:port]` form.
///
/// Strips any scheme and path, lowercases, and folds the aliases of the public
/// default registry into `docker.io`.
///
/// ```
/// use swarmsync_core::normalize_host;
///
/// assert_eq!(normalize_host("https://index.docker.io/v1/"), "docker.io");
/// assert_eq!(normalize_host("Registry.Example.com:5000"), "registry.example.com:5000");
/// ```
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let host = host
        .split_once("://")
        .map_or(host, |(_, rest)| rest);
    let host = host.split('/').next().unwrap_or_default().to_ascii_lowercase();

    if DEFAULT_REGISTRY_ALIASES.contains(&host.as_str()) {
        DEFAULT_REGISTRY.to_string()
    } else {
        host
    }
}

/// Returns the default credential file location.
///
/// `$DOCKER_CONFIG/config.json` when set, otherwise `~/.docker/config.json`.
pub fn default_credentials_path() -> PathBuf {
    std::env::var_os("DOCKER_CONFIG").map_or_else(
        || {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("/root"))
                .join(".docker")
                .join("config.json")
        },
        |dir| PathBuf::from(dir).join("config.json"),
    )
}

fn decode_auth(auth: &str) -> Option<(String, String)> {
    let bytes = STANDARD.decode(auth.trim()).ok()?;
    let decoded = String::from_utf8(bytes).ok()?;
    let mut parts = decoded.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(username), Some(password), None) => {
            Some((username.to_string(), password.to_string()))
        }
        _ => None,
    }
}

/// True when one host is the other plus a `:port` suffix.
fn shares_host_prefix(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    !short.is_empty() && long.strip_prefix(short).is_some_and(|rest| rest.starts_with(':'))
}
