//! Registry client tests against a mock registry.

use swarmsync_core::ImageReference;
use swarmsync_registry::{RegistryAuth, RegistryClient, RegistryConfig, RegistryError};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIGEST: &str = "sha256:5d3e8d6fd4a43d6d44f0d0b9d8d9a9fc0b2d5b9f6f2e0f6a6f3c6a3b2c1d0e9f";
const MANIFEST_PATH: &str = "/v2/team/app/manifests/1";

/// `user:secret`, base64 encoded.
const BASIC_USER_SECRET: &str = "Basic dXNlcjpzZWNyZXQ=";

fn client() -> RegistryClient {
    RegistryClient::new(RegistryConfig::new()).unwrap()
}

/// `team/app:1` hosted on the mock server.
fn image(server: &MockServer) -> ImageReference {
    ImageReference::parse(&format!("{}/team/app:1", server.address())).unwrap()
}

fn user_secret() -> RegistryAuth {
    RegistryAuth::basic("user", "secret")
}

// =============================================================================
// Anonymous Access
// =============================================================================

#[tokio::test]
async fn test_head_digest_header_is_used() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path(MANIFEST_PATH))
        .respond_with(ResponseTemplate::new(200).insert_header("Docker-Content-Digest", DIGEST))
        .expect(1)
        .mount(&server)
        .await;

    let digest = client()
        .manifest_digest(&image(&server), &RegistryAuth::None)
        .await
        .unwrap();
    assert_eq!(digest, DIGEST);
}

#[tokio::test]
async fn test_pinned_digest_is_not_sent() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path(MANIFEST_PATH))
        .respond_with(ResponseTemplate::new(200).insert_header("Docker-Content-Digest", DIGEST))
        .expect(1)
        .mount(&server)
        .await;

    let pinned = image(&server).with_digest("sha256:0000");
    let digest = client()
        .manifest_digest(&pinned, &RegistryAuth::None)
        .await
        .unwrap();
    assert_eq!(digest, DIGEST);
}

#[tokio::test]
async fn test_missing_digest_header_falls_back_to_hashing_manifest() {
    let server = MockServer::start().await;
    let manifest = r#"{"schemaVersion":2}"#;
    Mock::given(method("HEAD"))
        .and(path(MANIFEST_PATH))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(MANIFEST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(manifest))
        .expect(1)
        .mount(&server)
        .await;

    let digest = client()
        .manifest_digest(&image(&server), &RegistryAuth::None)
        .await
        .unwrap();
    assert_eq!(
        digest,
        "sha256:bafebd36189ad3688b7b3915ea55d461e0bfcfbdde11e54b0a123999fb6be50f"
    );
}

#[tokio::test]
async fn test_unknown_tag_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path(MANIFEST_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client()
        .manifest_digest(&image(&server), &RegistryAuth::None)
        .await
        .unwrap_err();
    match err {
        RegistryError::NotFound {
            repository,
            reference,
        } => {
            assert_eq!(repository, "team/app");
            assert_eq!(reference, "1");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

// =============================================================================
// Bearer Challenge
// =============================================================================

async fn mount_bearer_challenge(server: &MockServer) {
    let challenge = format!(
        r#"Bearer realm="{}/token",service="registry.test""#,
        server.uri()
    );
    Mock::given(method("HEAD"))
        .and(path(MANIFEST_PATH))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).insert_header("Docker-Content-Digest", DIGEST))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("HEAD"))
        .and(path(MANIFEST_PATH))
        .respond_with(ResponseTemplate::new(401).insert_header("WWW-Authenticate", challenge))
        .with_priority(10)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_bearer_challenge_exchanges_credentials_for_token() {
    let server = MockServer::start().await;
    mount_bearer_challenge(&server).await;
    Mock::given(method("GET"))
        .and(path("/token"))
        .and(query_param("service", "registry.test"))
        .and(query_param("scope", "repository:team/app:pull"))
        .and(header("authorization", BASIC_USER_SECRET))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"tok-123"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let digest = client()
        .manifest_digest(&image(&server), &user_secret())
        .await
        .unwrap();
    assert_eq!(digest, DIGEST);
}

#[tokio::test]
async fn test_bearer_challenge_without_credentials_fetches_anonymous_token() {
    let server = MockServer::start().await;
    mount_bearer_challenge(&server).await;
    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"access_token":"tok-123"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let digest = client()
        .manifest_digest(&image(&server), &RegistryAuth::None)
        .await
        .unwrap();
    assert_eq!(digest, DIGEST);

    let requests = server.received_requests().await.unwrap();
    let token_request = requests
        .iter()
        .find(|r| r.url.path() == "/token")
        .unwrap();
    assert!(!token_request.headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_token_endpoint_rejection_is_auth_error() {
    let server = MockServer::start().await;
    mount_bearer_challenge(&server).await;
    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client()
        .manifest_digest(&image(&server), &user_secret())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::AuthenticationFailed { .. }));
    assert!(err.is_auth_error());
}

#[tokio::test]
async fn test_token_reused_for_manifest_fallback() {
    let server = MockServer::start().await;
    let challenge = format!(r#"Bearer realm="{}/token""#, server.uri());
    Mock::given(method("HEAD"))
        .and(path(MANIFEST_PATH))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path(MANIFEST_PATH))
        .respond_with(ResponseTemplate::new(401).insert_header("WWW-Authenticate", challenge))
        .with_priority(10)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"token":"tok-123"}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(MANIFEST_PATH))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).insert_header("Docker-Content-Digest", DIGEST))
        .expect(1)
        .mount(&server)
        .await;

    let digest = client()
        .manifest_digest(&image(&server), &user_secret())
        .await
        .unwrap();
    assert_eq!(digest, DIGEST);
}

// =============================================================================
// Basic Challenge
// =============================================================================

async fn mount_basic_challenge(server: &MockServer) {
    Mock::given(method("HEAD"))
        .and(path(MANIFEST_PATH))
        .and(header("authorization", BASIC_USER_SECRET))
        .respond_with(ResponseTemplate::new(200).insert_header("Docker-Content-Digest", DIGEST))
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("HEAD"))
        .and(path(MANIFEST_PATH))
        .respond_with(
            ResponseTemplate::new(401).insert_header("WWW-Authenticate", r#"Basic realm="registry""#),
        )
        .with_priority(10)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_basic_challenge_retries_with_credentials() {
    let server = MockServer::start().await;
    mount_basic_challenge(&server).await;

    let digest = client()
        .manifest_digest(&image(&server), &user_secret())
        .await
        .unwrap();
    assert_eq!(digest, DIGEST);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn test_basic_challenge_without_credentials_fails() {
    let server = MockServer::start().await;
    mount_basic_challenge(&server).await;

    let err = client()
        .manifest_digest(&image(&server), &RegistryAuth::None)
        .await
        .unwrap_err();
    assert!(err.is_auth_error());
}

#[tokio::test]
async fn test_rejected_basic_credentials_fail() {
    let server = MockServer::start().await;
    mount_basic_challenge(&server).await;

    let err = client()
        .manifest_digest(&image(&server), &RegistryAuth::basic("user", "wrong"))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::AuthenticationFailed { .. }));
}

#[tokio::test]
async fn test_unparseable_challenge_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path(MANIFEST_PATH))
        .respond_with(ResponseTemplate::new(401).insert_header("WWW-Authenticate", "Negotiate"))
        .mount(&server)
        .await;

    let err = client()
        .manifest_digest(&image(&server), &user_secret())
        .await
        .unwrap_err();
    match err {
        RegistryError::InvalidChallenge { challenge } => assert_eq!(challenge, "Negotiate"),
        other => panic!("expected InvalidChallenge, got {other:?}"),
    }
}
