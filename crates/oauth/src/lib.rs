//! OAuth 2.0 credential lifecycle for the Atlassian API gateway.
//!
//! Acquires, refreshes, persists and re-attaches bearer tokens for Atlassian
//! Cloud (global token endpoint, site addressed by a Cloud ID) and Data Center
//! (token endpoint derived from the instance URL) deployments. Many
//! (client application, target instance) pairs can coexist on one machine
//! because every persisted token record is addressed by a scoped storage
//! identity.
//!
//! # Safety and Quality
//!
//! The crate forbids `unsafe` and propagates errors instead of panicking.
//! Exchange and refresh report success as a plain `bool` after logging the
//! failure; persistence failures are logged and swallowed.
//!
//! # Modules
//!
//! - `auth`: configuration model, token flows, token store, session seam
//! - `security`: platform keychain adapter backing the secure vault
//! - `testing`: in-memory vault fakes (`test-utils` feature)
//! - `error`: configuration error taxonomy

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod auth;
pub mod error;
pub mod security;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export commonly used types
// ------------------------------------------------------------------------
pub use auth::{
    configure_oauth_session, resolve_oauth_credentials, BYOAccessTokenOAuthConfig, BearerSession,
    CloudEndpoints, CloudIdResolver, EnvSource, InstanceType, OAuthClient, OAuthConfig,
    OAuthCredentials, OAuthEnvPrefix, SecretVault, StorageIdentity, StorageRecord, TokenStore,
    TokenStoreConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use security::{KeychainError, KeychainProvider};
