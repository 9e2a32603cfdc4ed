//! # Swarmsync Registry
//!
//! Registry HTTP API v2 client used to detect stale images.
//!
//! The client answers one question: what is the content digest of the
//! manifest a registry currently serves for `repository:tag`? Comparing that
//! digest with the one a service is pinned to tells whether the service is
//! stale, without pulling anything.
//!
//! ## Features
//!
//! - **Manifest digests**: `HEAD` first, `GET` and hash the body when the
//!   registry omits `Docker-Content-Digest`
//! - **Auth challenges**: Bearer token exchange and Basic auth on `401`
//! - **Docker Hub**: `docker.io` and `library/` handling
//! - **Insecure registries**: plain HTTP for configured hosts and `localhost`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use swarmsync_core::ImageReference;
//! use swarmsync_registry::{RegistryAuth, RegistryClient, RegistryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RegistryClient::new(RegistryConfig::default())?;
//!     let image = ImageReference::parse("nginx:1.25")?;
//!
//!     let digest = client.manifest_digest(&image, &RegistryAuth::None).await?;
//!     println!("{image} -> {digest}");
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod client;
mod config;
mod error;
mod oci;

pub use client::RegistryClient;
pub use config::{RegistryAuth, RegistryConfig, TlsConfig};
pub use error::RegistryError;
pub use oci::{Challenge, MediaType};
