//! Registry HTTP API v2 client for manifest digest resolution.
//!
//! This module provides the client used to ask a registry which manifest a
//! tag currently points at, without pulling any image data.

use crate::config::{RegistryAuth, RegistryConfig};
use crate::error::RegistryError;
use crate::oci::{Challenge, MediaType, TokenResponse};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Method, Response, StatusCode};
use sha2::{Digest, Sha256};
use swarmsync_core::ImageReference;

/// Header carrying the canonical manifest digest.
const CONTENT_DIGEST: &str = "docker-content-digest";

/// Client for resolving manifest digests from OCI-compatible registries.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    config: RegistryConfig,
    http: reqwest::Client,
}

impl RegistryClient {
    /// Creates a new registry client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use swarmsync_registry::{RegistryClient, RegistryConfig};
    ///
    /// let client = RegistryClient::new(RegistryConfig::new())?;
    /// # Ok::<(), swarmsync_registry::RegistryError>(())
    /// ```
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let http = Self::build_http_client(&config)?;
        Ok(Self { config, http })
    }

    /// Returns the registry configuration.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Resolves the digest of the manifest `image`'s tag currently points at.
    ///
    /// Any digest already pinned on `image` is ignored; only the repository
    /// and tag are sent to the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be reached, rejects the
    /// credentials, or does not know the tag.
    pub async fn manifest_digest(
        &self,
        image: &ImageReference,
        auth: &RegistryAuth,
    ) -> Result<String, RegistryError> {
        let repository = image.api_repository();
        let url = format!(
            "{}/v2/{repository}/manifests/{}",
            self.config.endpoint(image.registry()),
            image.tag()
        );

        let (response, auth) = self.send_authorized(Method::HEAD, &url, &repository, auth).await?;
        let response = Self::check_status(response, &repository, image.tag()).await?;

        if let Some(digest) = Self::content_digest(response.headers()) {
            tracing::debug!(image = %image.name_with_tag(), %digest, "resolved manifest digest");
            return Ok(digest);
        }

        // Some registries omit the digest header on HEAD; hash the manifest body.
        tracing::debug!(url = %url, "no content digest on HEAD, fetching manifest");
        let response = self
            .http
            .get(&url)
            .headers(Self::auth_headers(&auth)?)
            .header(ACCEPT, MediaType::manifest_accept())
            .send()
            .await?;
        let response = Self::check_status(response, &repository, image.tag()).await?;

        if let Some(digest) = Self::content_digest(response.headers()) {
            return Ok(digest);
        }
        let body = response.bytes().await?;
        Ok(Self::compute_digest(&body))
    }

    /// Sends a manifest request, answering one auth challenge if needed.
    ///
    /// Returns the response together with the auth that produced it, so
    /// follow-up requests can reuse an exchanged token.
    async fn send_authorized(
        &self,
        method: Method,
        url: &str,
        repository: &str,
        auth: &RegistryAuth,
    ) -> Result<(Response, RegistryAuth), RegistryError> {
        // Basic credentials are only sent once the registry asks for them.
        let initial = match auth {
            RegistryAuth::Bearer { .. } => auth.clone(),
            RegistryAuth::None | RegistryAuth::Basic { .. } => RegistryAuth::None,
        };

        let response = self.request(method.clone(), url, &initial).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok((response, initial));
        }

        let header = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let retry_auth = match Challenge::parse(&header) {
            Some(Challenge::Bearer {
                realm,
                service,
                scope,
            }) => {
                let scope = scope.unwrap_or_else(|| format!("repository:{repository}:pull"));
                let token = self
                    .fetch_token(&realm, service.as_deref(), &scope, auth)
                    .await?;
                RegistryAuth::bearer(token)
            }
            Some(Challenge::Basic { .. }) if auth.basic_credentials().is_some() => auth.clone(),
            Some(Challenge::Basic { .. }) => {
                return Err(RegistryError::AuthenticationFailed {
                    message: format!("{url} requires credentials"),
                })
            }
            None => return Err(RegistryError::InvalidChallenge { challenge: header }),
        };

        let response = self.request(method, url, &retry_auth).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(RegistryError::AuthenticationFailed {
                message: format!("credentials rejected by {url}"),
            });
        }
        Ok((response, retry_auth))
    }

    async fn request(
        &self,
        method: Method,
        url: &str,
        auth: &RegistryAuth,
    ) -> Result<Response, RegistryError> {
        self.http
            .request(method, url)
            .headers(Self::auth_headers(auth)?)
            .header(ACCEPT, MediaType::manifest_accept())
            .send()
            .await
            .map_err(Into::into)
    }

    /// Exchanges credentials for a bearer token at the challenge realm.
    async fn fetch_token(
        &self,
        realm: &str,
        service: Option<&str>,
        scope: &str,
        auth: &RegistryAuth,
    ) -> Result<String, RegistryError> {
        let mut url = url::Url::parse(realm).map_err(|_| RegistryError::InvalidUrl {
            url: realm.to_string(),
        })?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(service) = service {
                query.append_pair("service", service);
            }
            query.append_pair("scope", scope);
        }

        let mut request = self.http.get(url.as_str());
        if let Some((username, password)) = auth.basic_credentials() {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(RegistryError::AuthenticationFailed {
                message: format!("token request to {realm} failed: {}", response.status()),
            });
        }

        let token: TokenResponse = serde_json::from_slice(&response.bytes().await?)?;
        token
            .into_token()
            .ok_or_else(|| RegistryError::AuthenticationFailed {
                message: format!("token endpoint {realm} returned no token"),
            })
    }

    /// Maps non-success statuses to errors.
    async fn check_status(
        response: Response,
        repository: &str,
        reference: &str,
    ) -> Result<Response, RegistryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound {
                repository: repository.to_string(),
                reference: reference.to_string(),
            });
        }
        Err(RegistryError::HttpError {
            status: status.as_u16(),
            message: response.text().await.unwrap_or_default(),
        })
    }

    fn content_digest(headers: &HeaderMap) -> Option<String> {
        headers
            .get(CONTENT_DIGEST)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| v.contains(':'))
            .map(ToString::to_string)
    }

    /// Builds the HTTP client with proper configuration.
    fn build_http_client(config: &RegistryConfig) -> Result<reqwest::Client, RegistryError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent);

        if let Some(ref tls) = config.tls {
            if tls.insecure_skip_verify {
                builder = builder.danger_accept_invalid_certs(true);
            }

            if let Some(ref ca_cert) = tls.ca_cert {
                let cert_pem = std::fs::read(ca_cert).map_err(|e| RegistryError::IoError {
                    path: ca_cert.clone(),
                    source: e,
                })?;
                let cert = reqwest::Certificate::from_pem(&cert_pem).map_err(|e| {
                    RegistryError::TlsConfig {
                        message: format!("Invalid CA certificate: {e}"),
                    }
                })?;
                builder = builder.add_root_certificate(cert);
            }
        }

        builder.build().map_err(|e| RegistryError::TlsConfig {
            message: format!("Failed to build HTTP client: {e}"),
        })
    }

    /// Creates authentication headers based on configuration.
    fn auth_headers(auth: &RegistryAuth) -> Result<HeaderMap, RegistryError> {
        let mut headers = HeaderMap::new();

        match auth {
            RegistryAuth::None => {}
            RegistryAuth::Basic { username, password } => {
                let credentials = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{username}:{password}"),
                );
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Basic {credentials}")).map_err(|_| {
                        RegistryError::AuthenticationFailed {
                            message: "Invalid credentials".to_string(),
                        }
                    })?,
                );
            }
            RegistryAuth::Bearer { token } => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                        RegistryError::AuthenticationFailed {
                            message: "Invalid token".to_string(),
                        }
                    })?,
                );
            }
        }

        Ok(headers)
    }

    /// Computes SHA-256 digest of data.
    fn compute_digest(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("sha256:{}", hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = RegistryClient::new(RegistryConfig::new());
        assert!(client.is_ok());
    }

    #[test]
    fn test_compute_digest() {
        let digest = RegistryClient::compute_digest(b"test data");
        assert!(digest.starts_with("sha256:"));
        assert_eq!(digest.len(), 7 + 64); // "sha256:" + 64 hex chars
        assert_eq!(
            digest,
            "sha256:916f0027a575074ce72a331777c3478d6513f786a591bd892da1a577bf2335f9"
        );
    }

    #[test]
    fn test_auth_headers_none() {
        let headers = RegistryClient::auth_headers(&RegistryAuth::None).unwrap();
        assert!(headers.is_empty());
    }

    #[test]
    fn test_auth_headers_basic() {
        let headers = RegistryClient::auth_headers(&RegistryAuth::basic("user", "pass")).unwrap();
        let auth = headers.get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert_eq!(auth, "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_auth_headers_bearer() {
        let headers = RegistryClient::auth_headers(&RegistryAuth::bearer("my-token")).unwrap();
        let auth = headers.get(AUTHORIZATION).unwrap().to_str().unwrap();
        assert_eq!(auth, "Bearer my-token");
    }

    #[test]
    fn test_content_digest_header() {
        let mut headers = HeaderMap::new();
        assert!(RegistryClient::content_digest(&headers).is_none());

        headers.insert(CONTENT_DIGEST, HeaderValue::from_static("sha256:abc"));
        assert_eq!(
            RegistryClient::content_digest(&headers).as_deref(),
            Some("sha256:abc")
        );

        headers.insert(CONTENT_DIGEST, HeaderValue::from_static("garbage"));
        assert!(RegistryClient::content_digest(&headers).is_none());
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_connection_error() {
        let config = RegistryConfig::new()
            .with_timeout(std::time::Duration::from_secs(2))
            .with_insecure_registry("127.0.0.1:1");
        let client = RegistryClient::new(config).unwrap();
        let image = ImageReference::parse("127.0.0.1:1/app:latest").unwrap();

        let result = client.manifest_digest(&image, &RegistryAuth::None).await;
        assert!(matches!(result, Err(RegistryError::ConnectionFailed { .. })));
    }
}
