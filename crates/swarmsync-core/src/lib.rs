//! # Swarmsync Core
//!
//! Core types shared by the swarmsync reconciler.
//!
//! This crate provides the foundational data structures used throughout the
//! swarmsync workspace, including:
//!
//! - [`ImageReference`] - Parsed `[registry/]repository[:tag][@digest]` references
//! - [`CredentialStore`] - Registry logins loaded from a Docker credential file
//! - [`Schedule`] - Five-field cron-like trigger evaluated once per tick
//!
//! ## Example
//!
//! ```rust
//! use swarmsync_core::{ImageReference, Schedule};
//!
//! let image = ImageReference::parse("registry.example.com/team/api:1.4@sha256:abc").unwrap();
//! assert_eq!(image.registry(), "registry.example.com");
//! assert_eq!(image.name_with_tag(), "registry.example.com/team/api:1.4");
//!
//! let schedule = Schedule::parse(["*/5 * * * *"]);
//! assert!(schedule.is_valid());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod credentials;
pub mod error;
pub mod image;
pub mod schedule;


// Re-export main types at crate root
pub use credentials::{default_credentials_path, normalize_host, Credential, CredentialStore};
pub use error::{Error, Result};
pub use image::{ImageReference, DEFAULT_REGISTRY, DEFAULT_TAG};
pub use schedule::{Field, Schedule, FIELD_COUNT};
