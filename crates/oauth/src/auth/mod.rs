//! OAuth 2.0 (3LO) credential lifecycle
//!
//! Acquires, refreshes, persists and attaches bearer tokens for Atlassian
//! Cloud and Data Center instances.
//!
//! # Features
//!
//! - **Code Exchange**: authorization code to access + refresh token
//! - **Lazy Refresh**: refresh only when the token is within five minutes of
//!   expiry, keeping a rotated refresh token when one is issued
//! - **Cloud Site Resolution**: Cloud ID lookup via accessible resources
//! - **Scoped Storage**: one record per (client, instance), in the platform
//!   keychain and a JSON file, with migration from the unscoped layout
//! - **Session Seam**: one call attaches a valid bearer header to a client
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐
//! │ configure_oauth_session  │  Called once per REST client construction
//! └────────────┬─────────────┘
//!              │
//!              └──► OAuthClient            (exchange / refresh / restore)
//!                        │
//!                        ├──► CloudIdResolver   (Cloud only)
//!                        └──► TokenStore
//!                                  │
//!                                  ├──► SecretVault (KeychainProvider)
//!                                  └──► ~/.mcp-atlassian/<storage_id>.json
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use mcp_atlassian_oauth::auth::{
//!     configure_oauth_session, resolve_oauth_credentials, OAuthClient, OAuthEnvPrefix,
//!     ProcessEnv,
//! };
//! use reqwest::header::HeaderMap;
//!
//! let client = OAuthClient::new_default();
//! let resolved = resolve_oauth_credentials(
//!     &ProcessEnv,
//!     &OAuthEnvPrefix::service("jira"),
//!     Some("https://jira.example.com"),
//! )?;
//!
//! if let Some(mut credentials) = resolved {
//!     if let Some(config) = credentials.oauth_config_mut() {
//!         client.restore_tokens(config);
//!     }
//!
//!     let mut headers = HeaderMap::new();
//!     if !configure_oauth_session(&mut headers, &mut credentials, &client) {
//!         return Err("OAuth authentication failed".into());
//!     }
//!     let _http = reqwest::blocking::Client::builder().default_headers(headers).build()?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod client;
pub mod cloud;
pub mod env;
pub mod identity;
pub mod session;
pub mod store;
pub mod traits;
pub mod types;

pub use client::{OAuthClient, OAuthClientError};
pub use cloud::{AccessibleResource, CloudIdResolver};
pub use env::{
    resolve_oauth_credentials, EnvSource, OAuthCredentials, OAuthEnvPrefix, ProcessEnv,
};
pub use identity::StorageIdentity;
pub use session::{configure_oauth_session, BearerSession};
pub use store::{SaveOutcome, StoreError, TokenStore, TokenStoreConfig};
pub use traits::SecretVault;
pub use types::{
    mask_token, BYOAccessTokenOAuthConfig, CloudEndpoints, InstanceType, OAuthConfig,
    OAuthError, StorageRecord, TokenResponse,
};
