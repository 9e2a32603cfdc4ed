//! Registry protocol types.
//!
//! Media types accepted when resolving a tag, the `WWW-Authenticate`
//! challenge grammar, and the token endpoint response.

use std::collections::HashMap;

use serde::Deserialize;

/// Manifest media types understood by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MediaType;

impl MediaType {
    /// Docker manifest list (multi-platform) media type.
    pub const DOCKER_MANIFEST_LIST: &'static str =
        "application/vnd.docker.distribution.manifest.list.v2+json";

    /// Docker image manifest v2 media type.
    pub const DOCKER_MANIFEST: &'static str =
        "application/vnd.docker.distribution.manifest.v2+json";

    /// OCI image index media type.
    pub const OCI_INDEX: &'static str = "application/vnd.oci.image.index.v1+json";

    /// OCI image manifest media type.
    pub const OCI_MANIFEST: &'static str = "application/vnd.oci.image.manifest.v1+json";

    /// Returns the `Accept` header used when resolving a tag.
    ///
    /// Index types come first so that multi-platform tags resolve to the
    /// digest the orchestrator records when it pins a service.
    #[must_use]
    pub fn manifest_accept() -> String {
        [
            Self::DOCKER_MANIFEST_LIST,
            Self::OCI_INDEX,
            Self::DOCKER_MANIFEST,
            Self::OCI_MANIFEST,
        ]
        .join(", ")
    }
}

/// An authentication challenge from a `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    /// Token authentication against a separate token service.
    Bearer {
        /// Token endpoint URL.
        realm: String,
        /// Service name to request a token for.
        service: Option<String>,
        /// Requested scope.
        scope: Option<String>,
    },

    /// HTTP Basic authentication.
    Basic {
        /// Protection realm, informational only.
        realm: Option<String>,
    },
}

impl Challenge {
    /// Parses a `WWW-Authenticate` header value.
    ///
    /// # Examples
    ///
    /// ```
    /// use swarmsync_registry::Challenge;
    ///
    /// let challenge = Challenge::parse(
    ///     r#"Bearer realm="https://auth.docker.io/token",service="registry.docker.io""#,
    /// ).unwrap();
    /// assert!(matches!(challenge, Challenge::Bearer { ref realm, .. } if realm == "https://auth.docker.io/token"));
    /// ```
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(' ').unwrap_or((header, ""));
        let mut params = parse_params(rest);

        if scheme.eq_ignore_ascii_case("bearer") {
            let realm = params.remove("realm")?;
            Some(Self::Bearer {
                realm,
                service: params.remove("service"),
                scope: params.remove("scope"),
            })
        } else if scheme.eq_ignore_ascii_case("basic") {
            Some(Self::Basic {
                realm: params.remove("realm"),
            })
        } else {
            None
        }
    }
}

/// Splits `key="value",key=value` pairs, honouring quotes.
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut in_quotes = false;

    let mut flush = |key: &mut String, value: &mut String| {
        let k = key.trim().to_ascii_lowercase();
        if !k.is_empty() {
            params.insert(k, value.trim().to_string());
        }
        key.clear();
        value.clear();
    };

    for c in input.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            '=' if !in_value && !in_quotes => in_value = true,
            ',' if !in_quotes => {
                flush(&mut key, &mut value);
                in_value = false;
            }
            c if in_value => value.push(c),
            c => key.push(c),
        }
    }
    flush(&mut key, &mut value);

    params
}

/// Response from a registry token endpoint.
///
/// Registries return the token as `token`, `access_token`, or both.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

impl TokenResponse {
    pub(crate) fn into_token(self) -> Option<String> {
        self.token
            .filter(|t| !t.is_empty())
            .or(self.access_token)
            .filter(|t| !t.is_empty())
    }
}
