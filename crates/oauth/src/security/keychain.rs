//! Platform keychain provider backing the secure credential vault
//!
//! Thin wrapper over the `keyring` crate: macOS Keychain, Windows Credential
//! Manager, or the Linux kernel keyring, selected per target in the crate
//! manifest.
//!
//! Entries are addressed by a fixed service name and a per-record username.
//! For OAuth tokens the username is the storage identity and the value is
//! the JSON-serialized token record (see `auth::store`).
//!
//! ## Usage
//!
//! ```no_run
//! use mcp_atlassian_oauth::security::KeychainProvider;
//!
//! let keychain = KeychainProvider::new("mcp-atlassian-oauth");
//! keychain.set_secret("oauth-example", "{\"access_token\":\"...\"}")?;
//! let secret = keychain.get_secret("oauth-example")?;
//! # Ok::<(), mcp_atlassian_oauth::security::KeychainError>(())
//! ```

use keyring::Entry;
use thiserror::Error;
use tracing::debug;

/// Service name under which all OAuth token records are stored
pub const KEYRING_SERVICE_NAME: &str = "mcp-atlassian-oauth";

/// Keychain provider for secure credential storage
#[derive(Debug, Clone)]
pub struct KeychainProvider {
    service_name: String,
}

impl KeychainProvider {
    /// Create a new keychain provider for a specific service
    ///
    /// # Examples
    /// ```
    /// use mcp_atlassian_oauth::security::KeychainProvider;
    ///
    /// let keychain = KeychainProvider::new("mcp-atlassian-oauth");
    /// assert_eq!(keychain.service_name(), "mcp-atlassian-oauth");
    /// ```
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    /// Service name every entry is filed under
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Store a secret value in the platform keychain
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if keychain access fails
    pub fn set_secret(&self, key: &str, value: &str) -> Result<(), KeychainError> {
        debug!(service = %self.service_name, key = %key, "Storing secret in keychain");

        self.create_entry(key)?.set_password(value).map_err(|e| classify("store", key, &e))?;

        debug!(service = %self.service_name, key = %key, "Secret stored successfully");

        Ok(())
    }

    /// Retrieve a secret value from the platform keychain
    ///
    /// # Errors
    /// Returns `KeychainError::NotFound` if secret doesn't exist
    /// Returns `KeychainError::AccessFailed` if keychain access fails
    pub fn get_secret(&self, key: &str) -> Result<String, KeychainError> {
        debug!(service = %self.service_name, key = %key, "Retrieving secret from keychain");

        let secret = self.create_entry(key)?.get_password().map_err(|e| classify("retrieve", key, &e))?;

        debug!(service = %self.service_name, key = %key, "Secret retrieved successfully");

        Ok(secret)
    }

    /// Delete a secret from the platform keychain (idempotent)
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if the entry exists but cannot be
    /// removed
    pub fn delete_secret(&self, key: &str) -> Result<(), KeychainError> {
        debug!(service = %self.service_name, key = %key, "Deleting secret from keychain");

        match self.create_entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(classify("delete", key, &e)),
        }
    }

    /// Check if a secret exists in the keychain
    #[must_use]
    pub fn secret_exists(&self, key: &str) -> bool {
        self.create_entry(key).is_ok_and(|entry| entry.get_password().is_ok())
    }

    fn create_entry(&self, account: &str) -> Result<Entry, KeychainError> {
        Entry::new(&self.service_name, account).map_err(|e| {
            KeychainError::AccessFailed(format!("Failed to create keychain entry for {account}: {e}"))
        })
    }
}

/// A missing entry is `NotFound`; every other backend failure is
/// `AccessFailed` naming the action and key.
fn classify(action: &str, key: &str, err: &keyring::Error) -> KeychainError {
    match err {
        keyring::Error::NoEntry => KeychainError::NotFound,
        other => KeychainError::AccessFailed(format!("Failed to {action} secret for {key}: {other}")),
    }
}

impl Default for KeychainProvider {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE_NAME)
    }
}

/// Keychain error types
#[derive(Debug, Error)]
pub enum KeychainError {
    /// Keychain access failed (permission denied, no backend, locked, etc.)
    #[error("Keychain access failed: {0}")]
    AccessFailed(String),

    /// Entry not found in keychain
    #[error("Entry not found")]
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_provider_uses_oauth_service_name() {
        let keychain = KeychainProvider::default();
        assert_eq!(keychain.service_name(), KEYRING_SERVICE_NAME);
    }

    #[test]
    fn custom_service_name_is_kept() {
        let keychain = KeychainProvider::new("mcp-atlassian-oauth.test");
        assert_eq!(keychain.service_name, "mcp-atlassian-oauth.test");
    }

    #[test]
    fn missing_entry_classifies_as_not_found() {
        assert!(matches!(classify("retrieve", "k1", &keyring::Error::NoEntry), KeychainError::NotFound));
    }

    #[test]
    fn backend_failure_names_action_and_key() {
        let err = keyring::Error::Invalid("service".to_string(), "must not be empty".to_string());
        let KeychainError::AccessFailed(message) = classify("store", "oauth-k1", &err) else {
            panic!("backend failures are access failures");
        };
        assert!(message.starts_with("Failed to store secret for oauth-k1: "));
    }

    #[test]
    fn not_found_has_stable_message() {
        assert_eq!(KeychainError::NotFound.to_string(), "Entry not found");
    }
}
