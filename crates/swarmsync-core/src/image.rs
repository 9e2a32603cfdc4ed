//! Container image references.
//!
//! An image reference has the shape `[registry/]repository[:tag][@digest]`.
//! `repository:tag` is the identity used to pull and inspect an image, while
//! the digest records the exact content that is deployed.

use std::fmt;

use crate::credentials::normalize_host;
use crate::error::{Error, Result};

/// Registry host used when a reference names no registry.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Tag used when a reference names no tag.
pub const DEFAULT_TAG: &str = "latest";

/// A parsed container image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    registry: String,
    explicit_registry: bool,
    repository: String,
    tag: String,
    digest: Option<String>,
}

impl ImageReference {
    /// Parses an image reference.
    ///
    /// The first path segment is taken as the registry host when the
    /// reference contains more than one `/`, or when that segment looks like a
    /// host (`.` or `:` in it, or `localhost`). Otherwise the image lives on
    /// [`DEFAULT_REGISTRY`].
    ///
    /// # Examples
    ///
    /// ```
    /// use swarmsync_core::ImageReference;
    ///
    /// let image = ImageReference::parse("nginx").unwrap();
    /// assert_eq!(image.registry(), "docker.io");
    /// assert_eq!(image.tag(), "latest");
    ///
    /// let image = ImageReference::parse("localhost:5000/api:2@sha256:abc").unwrap();
    /// assert_eq!(image.registry(), "localhost:5000");
    /// assert_eq!(image.repository(), "api");
    /// assert_eq!(image.digest(), Some("sha256:abc"));
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidImageReference`] for empty references, empty
    /// repositories or tags, and digests without an algorithm prefix.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        let invalid = |reason: &str| Error::InvalidImageReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        if reference.is_empty() {
            return Err(invalid("reference is empty"));
        }

        let (name, digest) = match reference.rsplit_once('@') {
            Some((name, digest)) => {
                if !digest.contains(':') || digest.ends_with(':') {
                    return Err(invalid("digest must be of the form algorithm:hex"));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A ':' after the last '/' separates the tag; earlier ones are ports.
        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name[..split], &name[split + 1..])
            }
            None => (name, DEFAULT_TAG),
        };

        if tag.is_empty() {
            return Err(invalid("tag is empty"));
        }

        let (registry, explicit_registry, repository) = match name.split_once('/') {
            Some((first, rest)) if name.matches('/').count() > 1 || looks_like_host(first) => {
                (first.to_string(), true, rest)
            }
            _ => (DEFAULT_REGISTRY.to_string(), false, name),
        };

        if repository.is_empty() || repository.starts_with('/') || repository.ends_with('/') {
            return Err(invalid("repository is empty"));
        }

        Ok(Self {
            registry,
            explicit_registry,
            repository: repository.to_string(),
            tag: tag.to_string(),
            digest,
        })
    }

    /// Returns the registry host (`docker.io` when none was given).
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Returns the repository path without the registry host.
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Returns the tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Returns the pinned digest, if any.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Returns the repository path as the registry API expects it.
    ///
    /// Official images on the default registry live under `library/`.
    ///
    /// ```
    /// use swarmsync_core::ImageReference;
    ///
    /// let image = ImageReference::parse("redis:7").unwrap();
    /// assert_eq!(image.api_repository(), "library/redis");
    /// ```
    pub fn api_repository(&self) -> String {
        if normalize_host(&self.registry) == DEFAULT_REGISTRY && !self.repository.contains('/') {
            format!("library/{}", self.repository)
        } else {
            self.repository.clone()
        }
    }

    /// Returns the name as written, without tag or digest.
    pub fn name(&self) -> String {
        if self.explicit_registry {
            format!("{}/{}", self.registry, self.repository)
        } else {
            self.repository.clone()
        }
    }

    /// Returns `name:tag`, the identity used for pull and inspect.
    pub fn name_with_tag(&self) -> String {
        format!("{}:{}", self.name(), self.tag)
    }

    /// Returns a copy pinned to `digest`.
    #[must_use]
    pub fn with_digest(&self, digest: impl Into<String>) -> Self {
        Self {
            digest: Some(digest.into()),
            ..self.clone()
        }
    }

    /// Returns a copy with the digest stripped.
    #[must_use]
    pub fn without_digest(&self) -> Self {
        Self {
            digest: None,
            ..self.clone()
        }
    }

    /// Returns true if `digest` is the content this reference is pinned to.
    pub fn is_pinned_to(&self, digest: &str) -> bool {
        self.digest.as_deref() == Some(digest)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name_with_tag())?;
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn looks_like_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}
