//! Configuration error taxonomy.
//!
//! Only malformed static configuration fails loudly. Token issuance failures
//! are reported as `false` by the flows in [`crate::auth::client`], and
//! persistence failures never leave [`crate::auth::store`].

use thiserror::Error;

/// A required static field is missing or malformed for the selected topology.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Data Center topology without an instance URL
    #[error("Data Center OAuth requires an instance URL")]
    MissingInstanceUrl,

    /// Instance URL could not be parsed
    #[error("Invalid instance URL '{url}': {reason}")]
    InvalidInstanceUrl {
        /// URL as supplied
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// Unrecognized instance type string
    #[error("Unknown instance type '{0}' (expected 'cloud' or 'datacenter')")]
    UnknownInstanceType(String),

    /// A Cloud site is required but no Cloud ID is known
    #[error("Cloud OAuth requires a cloud ID for this operation")]
    MissingCloudId,

    /// A required configuration value is absent
    #[error("Missing required configuration value: {0}")]
    MissingValue(String),
}

/// Result alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_missing_piece() {
        assert_eq!(
            ConfigError::MissingInstanceUrl.to_string(),
            "Data Center OAuth requires an instance URL"
        );
        assert!(ConfigError::UnknownInstanceType("mainframe".into())
            .to_string()
            .contains("mainframe"));
        assert!(ConfigError::MissingValue("ATLASSIAN_OAUTH_CLIENT_ID".into())
            .to_string()
            .ends_with("ATLASSIAN_OAUTH_CLIENT_ID"));
    }
}
