//! Storage identity derivation
//!
//! Token records are keyed per (client, topology, instance) so that the same
//! OAuth application used against several sites never overwrites one
//! site's tokens with another's:
//!
//! ```text
//! oauth-<slug(client_id)>-<instance_type>-<slug(hint)>-<sha256(key)[..12]>
//! ```
//!
//! The hint is the Data Center host or the first 8 characters of the Cloud
//! ID, kept only for readability; the hash of the normalized instance key is
//! what separates instances.

use std::fmt;

use sha2::{Digest, Sha256};
use url::Url;

use super::types::InstanceType;

const STORAGE_PREFIX: &str = "oauth";
const CLIENT_SLUG_MAX_LEN: usize = 64;
const HINT_SLUG_MAX_LEN: usize = 48;
const CLOUD_HINT_LEN: usize = 8;
const HASH_LEN: usize = 12;
const UNKNOWN_HINT: &str = "unknown";

/// Key under which one token record is stored in the vault and on disk
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageIdentity(String);

impl StorageIdentity {
    /// Scoped identity for a (client, instance) pair.
    ///
    /// Pure and deterministic: the same inputs always yield the same string.
    ///
    /// The client ID enters the identity only through its slug, and the
    /// hash covers the instance key alone. Client IDs that differ only in
    /// characters outside `[A-Za-z0-9._]` (`my client` and `my-client`), or
    /// only past the 64th character, therefore share an identity on the same
    /// instance. Atlassian-issued client IDs are alphanumeric and pass
    /// through the slug unchanged.
    #[must_use]
    pub fn derive(
        client_id: &str,
        instance_type: InstanceType,
        instance_url: Option<&str>,
        cloud_id: Option<&str>,
    ) -> Self {
        let key = normalized_instance_key(instance_type, instance_url, cloud_id);
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        let hint = instance_hint(instance_type, instance_url, cloud_id);

        Self(format!(
            "{STORAGE_PREFIX}-{}-{}-{}-{}",
            slugify(client_id, CLIENT_SLUG_MAX_LEN),
            instance_type.as_str(),
            slugify(&hint, HINT_SLUG_MAX_LEN),
            &digest[..HASH_LEN],
        ))
    }

    /// Identity used before records were scoped per instance
    #[must_use]
    pub fn legacy(client_id: &str) -> Self {
        Self(format!("{STORAGE_PREFIX}-{client_id}"))
    }

    /// File-name prefix shared by every Cloud record of `client_id`
    #[must_use]
    pub fn cloud_file_prefix(client_id: &str) -> String {
        format!(
            "{STORAGE_PREFIX}-{}-{}-",
            slugify(client_id, CLIENT_SLUG_MAX_LEN),
            InstanceType::Cloud.as_str()
        )
    }

    /// The identity string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the on-disk record file
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl fmt::Display for StorageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StorageIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonical string identifying an instance.
///
/// Data Center: `datacenter:<scheme>://<host[:port]><path>` with scheme and
/// host lowercased and trailing slashes removed. Cloud: `cloud:<cloud_id>`.
#[must_use]
pub fn normalized_instance_key(
    instance_type: InstanceType,
    instance_url: Option<&str>,
    cloud_id: Option<&str>,
) -> String {
    match instance_type {
        InstanceType::Datacenter => {
            let raw = instance_url.unwrap_or_default().trim();
            let canonical = Url::parse(raw).map_or_else(
                |_| raw.trim_end_matches('/').to_ascii_lowercase(),
                |url| {
                    let host = url.host_str().unwrap_or_default();
                    let authority =
                        url.port().map_or_else(|| host.to_string(), |port| format!("{host}:{port}"));
                    format!("{}://{authority}{}", url.scheme(), url.path().trim_end_matches('/'))
                },
            );
            format!("datacenter:{canonical}")
        }
        InstanceType::Cloud => format!("cloud:{}", cloud_id.unwrap_or_default().trim()),
    }
}

fn instance_hint(
    instance_type: InstanceType,
    instance_url: Option<&str>,
    cloud_id: Option<&str>,
) -> String {
    let hint = match instance_type {
        InstanceType::Datacenter => instance_url
            .and_then(|raw| Url::parse(raw.trim()).ok())
            .and_then(|url| url.host_str().map(str::to_string)),
        InstanceType::Cloud => cloud_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| id.chars().take(CLOUD_HINT_LEN).collect()),
    };
    hint.unwrap_or_else(|| UNKNOWN_HINT.to_string())
}

/// Reduce `value` to characters safe in vault usernames and file names.
///
/// ASCII alphanumerics, `.` and `_` are kept; every other run of characters
/// becomes a single `-`. Leading and trailing separators are trimmed and an
/// empty result becomes `default`.
pub(crate) fn slugify(value: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut last_dash = false;
    for ch in value.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' {
            slug.push(ch);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }

    let mut slug: String = slug.trim_matches(['-', '.']).chars().take(max_len).collect();
    while slug.ends_with(['-', '.']) {
        slug.pop();
    }
    if slug.is_empty() {
        "default".to_string()
    } else {
        slug
    }
}
