//! In-memory credential vaults.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::auth::traits::SecretVault;
use crate::security::KeychainError;

type StorageData = Arc<Mutex<HashMap<String, String>>>;

/// Mock keychain provider storing secrets in memory.
///
/// Clones share the same backing map, so a test can hand one clone to a
/// `TokenStore` and inspect the other.
#[derive(Debug, Clone)]
pub struct MockKeychainProvider {
    storage: StorageData,
    service_name: String,
}

impl MockKeychainProvider {
    /// Create a new mock keychain provider with a service name for namespacing.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { storage: Arc::new(Mutex::new(HashMap::new())), service_name: service_name.into() }
    }

    /// Service name this fake was created with.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Determine whether a secret exists.
    #[must_use]
    pub fn secret_exists(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    /// Keys currently stored, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MockKeychainProvider {
    fn default() -> Self {
        Self::new(crate::security::KEYRING_SERVICE_NAME)
    }
}

impl SecretVault for MockKeychainProvider {
    fn get_secret(&self, key: &str) -> Result<String, KeychainError> {
        self.lock().get(key).cloned().ok_or(KeychainError::NotFound)
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<(), KeychainError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete_secret(&self, key: &str) -> Result<(), KeychainError> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Vault that fails every operation, standing in for a headless host
/// without a credential service.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableKeychain;

impl SecretVault for UnavailableKeychain {
    fn get_secret(&self, _key: &str) -> Result<String, KeychainError> {
        Err(KeychainError::AccessFailed("no secret service available".to_string()))
    }

    fn set_secret(&self, _key: &str, _value: &str) -> Result<(), KeychainError> {
        Err(KeychainError::AccessFailed("no secret service available".to_string()))
    }

    fn delete_secret(&self, _key: &str) -> Result<(), KeychainError> {
        Err(KeychainError::AccessFailed("no secret service available".to_string()))
    }
}
