//! Traits for credential vault operations
//!
//! The secure vault is process-wide external state, so the token store
//! receives it as an injected port. Production code uses the platform
//! [`KeychainProvider`]; tests substitute the in-memory fakes from
//! `crate::testing`.

use std::sync::Arc;

use crate::security::{KeychainError, KeychainProvider};

/// Small get/set/delete interface over a secure credential vault
///
/// Keys are storage identities; values are JSON-serialized token records.
pub trait SecretVault: Send + Sync {
    /// Retrieve the secret stored under `key`
    ///
    /// # Errors
    /// Returns `KeychainError::NotFound` if no entry exists, or
    /// `KeychainError::AccessFailed` if the vault is unavailable
    fn get_secret(&self, key: &str) -> Result<String, KeychainError>;

    /// Store `value` under `key`, replacing any previous value
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if the vault rejects the write
    fn set_secret(&self, key: &str, value: &str) -> Result<(), KeychainError>;

    /// Remove the entry under `key` (idempotent)
    ///
    /// # Errors
    /// Returns `KeychainError::AccessFailed` if the vault rejects the delete
    fn delete_secret(&self, key: &str) -> Result<(), KeychainError>;
}

impl SecretVault for KeychainProvider {
    fn get_secret(&self, key: &str) -> Result<String, KeychainError> {
        Self::get_secret(self, key)
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<(), KeychainError> {
        Self::set_secret(self, key, value)
    }

    fn delete_secret(&self, key: &str) -> Result<(), KeychainError> {
        Self::delete_secret(self, key)
    }
}

impl<V: SecretVault + ?Sized> SecretVault for Arc<V> {
    fn get_secret(&self, key: &str) -> Result<String, KeychainError> {
        (**self).get_secret(key)
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<(), KeychainError> {
        (**self).set_secret(key, value)
    }

    fn delete_secret(&self, key: &str) -> Result<(), KeychainError> {
        (**self).delete_secret(key)
    }
}
