//! Dual-backend token persistence
//!
//! Every save writes the secure vault and, always, a plain JSON file under
//! `~/.mcp-atlassian/` so tokens survive on hosts without a credential
//! service. Loads try the vault first and fall back to disk, consulting the
//! unscoped legacy identity last and migrating what they find.
//!
//! ```text
//! load order:
//!   1. vault  / scoped id
//!   2. vault  / legacy id      -> migrate
//!   3. file   / scoped id
//!   4. file   / newest oauth-<client>-cloud-*.json   (Cloud, site unknown)
//!   5. file   / legacy id      -> migrate
//! ```
//!
//! Migration is additive: the scoped record is written and the legacy entry
//! is left in place.

use std::cmp::Reverse;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::identity::StorageIdentity;
use super::traits::SecretVault;
use super::types::{InstanceType, StorageRecord};
use crate::security::{KeychainError, KeychainProvider};

/// Directory under the user's home holding token files
pub const TOKEN_DIR_NAME: &str = ".mcp-atlassian";

/// Errors from a single storage backend
///
/// Never surfaced by [`TokenStore`]'s public operations, which log and fall
/// through to the next backend instead.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Vault access failed
    #[error("keychain error: {0}")]
    Keychain(#[from] KeychainError),

    /// Filesystem access failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration for file-backed token storage.
#[derive(Debug, Clone)]
pub struct TokenStoreConfig {
    /// Directory holding `<storage_id>.json` files
    pub base_dir: PathBuf,
}

impl TokenStoreConfig {
    /// Store files under `base_dir`.
    #[must_use]
    pub const fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// `~/.mcp-atlassian`, or a relative `.mcp-atlassian` when no home
    /// directory can be determined.
    #[must_use]
    pub fn default_dir() -> PathBuf {
        directories::UserDirs::new().map_or_else(
            || PathBuf::from(TOKEN_DIR_NAME),
            |dirs| dirs.home_dir().join(TOKEN_DIR_NAME),
        )
    }
}

impl Default for TokenStoreConfig {
    fn default() -> Self {
        Self::new(Self::default_dir())
    }
}

/// Which backends accepted a save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveOutcome {
    /// Vault write succeeded
    pub vault: bool,
    /// File write succeeded
    pub file: bool,
}

impl SaveOutcome {
    /// Whether at least one backend holds the record
    #[must_use]
    pub const fn any(self) -> bool {
        self.vault || self.file
    }
}

/// Token record store over a secure vault plus the filesystem
#[derive(Debug, Clone)]
pub struct TokenStore<V: SecretVault = KeychainProvider> {
    vault: V,
    base_dir: PathBuf,
}

impl TokenStore<KeychainProvider> {
    /// Platform keychain plus `~/.mcp-atlassian`.
    #[must_use]
    pub fn new_default() -> Self {
        Self::new(KeychainProvider::default(), TokenStoreConfig::default())
    }
}

impl<V: SecretVault> TokenStore<V> {
    /// Create a store over `vault` writing files as configured.
    #[must_use]
    pub fn new(vault: V, config: TokenStoreConfig) -> Self {
        Self { vault, base_dir: config.base_dir }
    }

    /// Directory holding token files
    #[must_use]
    pub fn token_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the file record for `identity`
    #[must_use]
    pub fn token_path(&self, identity: &StorageIdentity) -> PathBuf {
        self.base_dir.join(identity.file_name())
    }

    /// The injected vault
    #[must_use]
    pub const fn vault(&self) -> &V {
        &self.vault
    }

    /// Persist `record` under `identity` in both backends.
    ///
    /// Failures are logged per backend; the file copy is written even when
    /// the vault write succeeds.
    #[must_use]
    pub fn save(&self, identity: &StorageIdentity, record: &StorageRecord) -> SaveOutcome {
        let vault = self
            .write_vault(identity, record)
            .inspect(|()| debug!(storage_id = %identity, "Saved OAuth tokens to keychain"))
            .inspect_err(|e| {
                warn!(storage_id = %identity, error = %e, "Failed to save OAuth tokens to keychain");
            })
            .is_ok();

        let file = self
            .write_file(identity, record)
            .inspect(|path| {
                debug!(storage_id = %identity, path = %path.display(), "Saved OAuth tokens to file");
            })
            .inspect_err(|e| {
                warn!(storage_id = %identity, error = %e, "Failed to save OAuth tokens to file");
            })
            .is_ok();

        if !vault && !file {
            warn!(storage_id = %identity, "OAuth tokens were not persisted to any backend");
        }
        SaveOutcome { vault, file }
    }

    /// Load the record for a (client, instance) pair, migrating legacy
    /// records to the scoped identity. Returns `None` when nothing usable is
    /// stored.
    #[must_use]
    pub fn load(
        &self,
        client_id: &str,
        instance_type: InstanceType,
        instance_url: Option<&str>,
        cloud_id: Option<&str>,
    ) -> Option<StorageRecord> {
        let scoped = StorageIdentity::derive(client_id, instance_type, instance_url, cloud_id);
        let legacy = StorageIdentity::legacy(client_id);

        if let Some(record) = self.try_vault(&scoped) {
            debug!(storage_id = %scoped, "Loaded OAuth tokens from keychain");
            return Some(record);
        }

        if let Some(record) = self.try_vault(&legacy) {
            if record.matches_instance(instance_type, instance_url, cloud_id) {
                info!(legacy_id = %legacy, "Found unscoped OAuth tokens in keychain, migrating");
                return Some(self.migrate(record, client_id, instance_type, instance_url, cloud_id));
            }
            debug!(legacy_id = %legacy, "Ignoring keychain record issued for another instance");
        }

        if let Some(record) = try_file(&self.token_path(&scoped)) {
            debug!(storage_id = %scoped, "Loaded OAuth tokens from file");
            return Some(record);
        }

        if instance_type == InstanceType::Cloud && cloud_id.is_none() {
            if let Some(record) = self.latest_cloud_file(client_id) {
                return Some(record);
            }
        }

        if let Some(record) = try_file(&self.token_path(&legacy)) {
            if record.matches_instance(instance_type, instance_url, cloud_id) {
                info!(legacy_id = %legacy, "Found unscoped OAuth token file, migrating");
                return Some(self.migrate(record, client_id, instance_type, instance_url, cloud_id));
            }
            debug!(legacy_id = %legacy, "Ignoring token file issued for another instance");
        }

        debug!(storage_id = %scoped, "No stored OAuth tokens found");
        None
    }

    /// Remove the record for `identity` from both backends.
    ///
    /// Returns whether both backends ended up without the entry.
    #[must_use]
    pub fn clear(&self, identity: &StorageIdentity) -> bool {
        let vault = self
            .vault
            .delete_secret(identity.as_str())
            .inspect_err(|e| {
                warn!(storage_id = %identity, error = %e, "Failed to delete OAuth tokens from keychain");
            })
            .is_ok();

        let file = match fs::remove_file(self.token_path(identity)) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                warn!(storage_id = %identity, error = %e, "Failed to delete OAuth token file");
                false
            }
        };

        vault && file
    }

    fn migrate(
        &self,
        mut record: StorageRecord,
        client_id: &str,
        instance_type: InstanceType,
        instance_url: Option<&str>,
        cloud_id: Option<&str>,
    ) -> StorageRecord {
        record.instance_type = Some(instance_type);
        match instance_type {
            InstanceType::Datacenter => {
                if let Some(url) = instance_url {
                    record.instance_url = Some(url.to_string());
                }
            }
            InstanceType::Cloud => {
                record.instance_url = None;
                if record.cloud_id.as_deref().map_or(true, str::is_empty) {
                    record.cloud_id = cloud_id.map(str::to_string);
                }
            }
        }

        let identity = StorageIdentity::derive(
            client_id,
            instance_type,
            record.instance_url.as_deref(),
            record.cloud_id.as_deref(),
        );
        let outcome = self.save(&identity, &record);
        if outcome.any() {
            info!(storage_id = %identity, "Migrated OAuth tokens to scoped storage");
        }
        record
    }

    /// Newest Cloud record of `client_id`, whatever its site. Only files
    /// whose name is exactly the identity their record derives to are
    /// considered, so a client whose ID merely starts with `client_id` is
    /// never picked up.
    fn latest_cloud_file(&self, client_id: &str) -> Option<StorageRecord> {
        let prefix = StorageIdentity::cloud_file_prefix(client_id);
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(dir = %self.base_dir.display(), error = %e, "Failed to list token directory");
                }
                return None;
            }
        };

        let mut candidates: Vec<(SystemTime, PathBuf, StorageRecord)> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_str().is_some_and(|name| name.starts_with(&prefix)))
            .filter_map(|entry| {
                let path = entry.path();
                let record = try_file(&path)?;
                if !is_cloud_file_of(client_id, &path, &record) {
                    debug!(path = %path.display(), "Skipping Cloud token file of another client");
                    return None;
                }
                let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
                Some((modified, path, record))
            })
            .collect();

        candidates.sort_by_key(|(modified, _, _)| Reverse(*modified));
        if candidates.len() > 1 {
            warn!(
                count = candidates.len(),
                chosen = %candidates[0].1.display(),
                "Multiple Cloud token files found for client and no cloud_id configured; \
                 using the most recently modified"
            );
        }

        let (_, path, record) = candidates.into_iter().next()?;
        info!(path = %path.display(), "Loaded OAuth tokens from Cloud token file");
        Some(record)
    }

    fn try_vault(&self, identity: &StorageIdentity) -> Option<StorageRecord> {
        self.read_vault(identity).unwrap_or_else(|e| {
            debug!(storage_id = %identity, error = %e, "Keychain lookup failed");
            None
        })
    }

    fn read_vault(&self, identity: &StorageIdentity) -> Result<Option<StorageRecord>, StoreError> {
        match self.vault.get_secret(identity.as_str()) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(KeychainError::NotFound) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_vault(&self, identity: &StorageIdentity, record: &StorageRecord) -> Result<(), StoreError> {
        let serialized = serde_json::to_string(record)?;
        self.vault.set_secret(identity.as_str(), &serialized)?;
        Ok(())
    }

    /// Write the JSON record. On unix a new file is created 0600, and a
    /// file left behind with wider permissions is narrowed to 0600.
    fn write_file(&self, identity: &StorageIdentity, record: &StorageRecord) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.base_dir)?;
        let path = self.token_path(identity);
        let serialized = serde_json::to_string_pretty(record)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(serialized.as_bytes())?;
        Ok(path)
    }
}

fn try_file(path: &Path) -> Option<StorageRecord> {
    read_file(path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Failed to read OAuth token file");
        None
    })
}

/// Whether `path` is named exactly as the Cloud identity `record` derives to
/// for `client_id`.
fn is_cloud_file_of(client_id: &str, path: &Path, record: &StorageRecord) -> bool {
    let cloud_id = record.cloud_id.as_deref().filter(|id| !id.is_empty());
    let expected = StorageIdentity::derive(client_id, InstanceType::Cloud, None, cloud_id);
    path.file_name().is_some_and(|name| name == expected.file_name().as_str())
}

fn read_file(path: &Path) -> Result<Option<StorageRecord>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&raw)?))
}
