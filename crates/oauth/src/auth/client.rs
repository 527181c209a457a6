//! OAuth 2.0 token flows for Atlassian Cloud and Data Center
//!
//! Handles the server side of the authorization-code grant:
//! - Authorization code exchange (RFC 6749 §4.1.3)
//! - Token refresh with optional rotation (RFC 6749 §6)
//! - Refresh-if-expired before a request
//! - Restoring persisted tokens at startup
//!
//! Public operations report success as `bool` and log the reason on failure;
//! token state on the [`OAuthConfig`] is only modified after a response has
//! been validated.

use std::time::Duration;

use reqwest::blocking::Client;
use tracing::{debug, error, info, warn};

use super::cloud::CloudIdResolver;
use super::store::TokenStore;
use super::traits::SecretVault;
use super::types::{
    expiry_from_now, mask_token, OAuthConfig, OAuthError, TokenResponse, DEFAULT_EXPIRES_IN_SECS,
};
use crate::error::ConfigError;
use crate::security::KeychainProvider;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
const ERROR_BODY_PREVIEW: usize = 200;

/// Error type for OAuth client operations
#[derive(Debug)]
pub enum OAuthClientError {
    /// HTTP request failed
    RequestFailed(reqwest::Error),

    /// OAuth server returned an error body
    OAuthError {
        /// HTTP status code
        status: u16,
        /// Decoded error body
        error: OAuthError,
    },

    /// Server returned a non-success status without an OAuth error body
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Failed to parse response
    ParseError(String),

    /// Code exchange response carried no refresh token
    MissingRefreshToken {
        /// Whether to suggest the Cloud `offline_access` scope
        offline_access_hint: bool,
    },

    /// No refresh token available
    NoRefreshToken,

    /// Invalid configuration
    ConfigError(ConfigError),
}

impl std::fmt::Display for OAuthClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestFailed(e) => write!(f, "HTTP request failed: {e}"),
            Self::OAuthError { status, error } => write!(f, "OAuth error (HTTP {status}): {error}"),
            Self::HttpStatus { status, body } => {
                let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
                write!(f, "Unexpected HTTP status {status}: {preview}")
            }
            Self::ParseError(msg) => write!(f, "Parse error: {msg}"),
            Self::MissingRefreshToken { offline_access_hint: true } => write!(
                f,
                "No refresh token in token response; \
                 ensure the 'offline_access' scope is requested"
            ),
            Self::MissingRefreshToken { offline_access_hint: false } => {
                write!(f, "No refresh token in token response")
            }
            Self::NoRefreshToken => write!(f, "No refresh token available"),
            Self::ConfigError(e) => write!(f, "Configuration error: {e}"),
        }
    }
}

impl std::error::Error for OAuthClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RequestFailed(e) => Some(e),
            Self::ConfigError(e) => Some(e),
            _ => None,
        }
    }
}

impl OAuthClientError {
    /// Classify a non-2xx response: a decodable OAuth error body wins over
    /// the bare status.
    pub(crate) fn from_error_response(status: u16, body: String) -> Self {
        serde_json::from_str::<OAuthError>(&body)
            .map_or_else(|_| Self::HttpStatus { status, body }, |error| Self::OAuthError { status, error })
    }
}

impl From<reqwest::Error> for OAuthClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::RequestFailed(err)
    }
}

impl From<ConfigError> for OAuthClientError {
    fn from(err: ConfigError) -> Self {
        Self::ConfigError(err)
    }
}

/// Token-lifecycle client
///
/// Owns the blocking HTTP client (5 s connect, 20 s overall timeout) and the
/// token store. Operations take the configuration by `&mut`; callers sharing
/// one configuration across threads serialize access themselves, which also
/// keeps two refreshes from racing on a rotating refresh token.
#[derive(Debug, Clone)]
pub struct OAuthClient<V: SecretVault = KeychainProvider> {
    http: Client,
    store: TokenStore<V>,
}

impl OAuthClient<KeychainProvider> {
    /// Client over the platform keychain and `~/.mcp-atlassian`.
    #[must_use]
    pub fn new_default() -> Self {
        Self::new(TokenStore::new_default())
    }
}

impl<V: SecretVault> OAuthClient<V> {
    /// Create a client persisting through `store`.
    #[must_use]
    pub fn new(store: TokenStore<V>) -> Self {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_http_client(store, http)
    }

    /// Create a client with a caller-built HTTP client.
    #[must_use]
    pub const fn with_http_client(store: TokenStore<V>, http: Client) -> Self {
        Self { http, store }
    }

    /// Token store used for persistence
    #[must_use]
    pub const fn store(&self) -> &TokenStore<V> {
        &self.store
    }

    /// Underlying HTTP client
    #[must_use]
    pub const fn http_client(&self) -> &Client {
        &self.http
    }

    /// Exchange an authorization code for tokens.
    ///
    /// On success the configuration holds the new access token, refresh
    /// token and expiry (`expires_in` defaults to 3600 s); for Cloud without
    /// a configured site the Cloud ID is resolved; the record is persisted.
    /// A response without a refresh token fails.
    pub fn exchange_code_for_tokens(&self, config: &mut OAuthConfig, code: &str) -> bool {
        self.try_exchange_code(config, code)
            .inspect_err(|e| {
                error!(
                    client_id = %config.client_id,
                    instance_type = %config.instance_type,
                    error = %e,
                    "Failed to exchange authorization code for tokens"
                );
            })
            .is_ok()
    }

    /// Obtain a new access token with the stored refresh token.
    ///
    /// A rotated refresh token replaces the stored one; otherwise the old one
    /// is kept. The updated record is persisted.
    pub fn refresh_access_token(&self, config: &mut OAuthConfig) -> bool {
        self.try_refresh(config)
            .inspect_err(|e| {
                error!(
                    client_id = %config.client_id,
                    instance_type = %config.instance_type,
                    error = %e,
                    "Failed to refresh access token"
                );
            })
            .is_ok()
    }

    /// Refresh only when the access token is missing or within five minutes
    /// of expiry.
    pub fn ensure_valid_token(&self, config: &mut OAuthConfig) -> bool {
        if !config.is_token_expired() {
            return true;
        }
        debug!(client_id = %config.client_id, "Access token expired or missing, refreshing");
        self.refresh_access_token(config)
    }

    /// Load the persisted record for this configuration's instance and apply
    /// it. Returns whether a record was found.
    pub fn restore_tokens(&self, config: &mut OAuthConfig) -> bool {
        if config.client_id.is_empty() {
            debug!("Skipping token restore: no client_id configured");
            return false;
        }

        let Some(record) = self.store.load(
            &config.client_id,
            config.instance_type,
            config.instance_url.as_deref(),
            config.cloud_id.as_deref(),
        ) else {
            return false;
        };

        config.apply_record(&record);
        info!(
            client_id = %config.client_id,
            instance_type = %config.instance_type,
            has_refresh_token = config.refresh_token.is_some(),
            "Restored OAuth tokens from storage"
        );
        true
    }

    fn try_exchange_code(&self, config: &mut OAuthConfig, code: &str) -> Result<(), OAuthClientError> {
        let token_url = config.token_url()?;
        info!(
            client_id = %config.client_id,
            instance_type = %config.instance_type,
            token_url = %token_url,
            "Exchanging authorization code for tokens"
        );

        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", config.redirect_uri.as_str()),
        ];
        let tokens = self.post_token_request(&token_url, &params)?;

        let refresh_token = tokens.refresh_token.filter(|t| !t.is_empty()).ok_or_else(|| {
            OAuthClientError::MissingRefreshToken { offline_access_hint: config.is_cloud() }
        })?;
        if tokens.access_token.is_empty() {
            return Err(OAuthClientError::ParseError("empty access_token".to_string()));
        }
        let expires_in = tokens.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        config.access_token = Some(tokens.access_token);
        config.refresh_token = Some(refresh_token);
        config.expires_at = Some(expiry_from_now(expires_in));

        self.resolve_site_and_persist(config);
        info!(
            client_id = %config.client_id,
            access_token = %config.access_token.as_deref().map_or_else(String::new, mask_token),
            expires_in,
            cloud_id = config.cloud_id.as_deref().unwrap_or_default(),
            "Authorization code exchanged"
        );
        Ok(())
    }

    fn try_refresh(&self, config: &mut OAuthConfig) -> Result<(), OAuthClientError> {
        let refresh_token = config
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(OAuthClientError::NoRefreshToken)?;
        let token_url = config.token_url()?;
        debug!(client_id = %config.client_id, token_url = %token_url, "Refreshing access token");

        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
        ];
        if config.is_datacenter() {
            params.push(("redirect_uri", config.redirect_uri.as_str()));
        }
        let tokens = self.post_token_request(&token_url, &params)?;

        if tokens.access_token.is_empty() {
            return Err(OAuthClientError::ParseError("empty access_token".to_string()));
        }
        let expires_in = tokens
            .expires_in
            .ok_or_else(|| OAuthClientError::ParseError("missing expires_in".to_string()))?;

        let rotated_refresh = tokens.refresh_token.filter(|t| !t.is_empty());
        let rotated = rotated_refresh.is_some();
        config.access_token = Some(tokens.access_token);
        if let Some(new_refresh) = rotated_refresh {
            config.refresh_token = Some(new_refresh);
        }
        config.expires_at = Some(expiry_from_now(expires_in));

        self.resolve_site_and_persist(config);
        info!(
            client_id = %config.client_id,
            expires_in,
            rotated,
            "Access token refreshed"
        );
        Ok(())
    }

    fn post_token_request(
        &self,
        token_url: &str,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, OAuthClientError> {
        let response = self
            .http
            .post(token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(params)
            .send()?;

        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(OAuthClientError::from_error_response(status.as_u16(), body));
        }

        serde_json::from_str(&body).map_err(|e| OAuthClientError::ParseError(e.to_string()))
    }

    /// Resolve the Cloud site if it is still unknown, then persist. Once a
    /// site is resolved the record saved under the site-less identity is
    /// stale and is removed.
    fn resolve_site_and_persist(&self, config: &mut OAuthConfig) {
        let unresolved = (config.is_cloud() && config.cloud_id.is_none())
            .then(|| config.storage_identity());

        if unresolved.is_some() {
            self.resolve_cloud_id(config);
        }
        self.persist(config);

        if let Some(stale) = unresolved.filter(|stale| *stale != config.storage_identity()) {
            let cleared = self.store.clear(&stale);
            debug!(storage_id = %stale, cleared, "Removed record saved before the Cloud site was known");
        }
    }

    fn resolve_cloud_id(&self, config: &mut OAuthConfig) {
        let Some(access_token) = config.access_token.as_deref() else {
            return;
        };
        let resolver = CloudIdResolver::from_endpoints(self.http.clone(), &config.cloud_endpoints);
        let resolved = resolver.resolve(access_token);
        if resolved.is_none() {
            warn!(
                client_id = %config.client_id,
                "Cloud ID could not be resolved; tokens are stored without a site"
            );
        }
        config.cloud_id = resolved;
    }

    fn persist(&self, config: &OAuthConfig) {
        let identity = config.storage_identity();
        let outcome = self.store.save(&identity, &config.to_record());
        if !outcome.any() {
            warn!(storage_id = %identity, "OAuth tokens are only held in memory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::TokenStoreConfig;
    use crate::auth::types::now_epoch_seconds;
    use crate::testing::MockKeychainProvider;
    use tempfile::TempDir;

    fn test_client() -> (TempDir, MockKeychainProvider, OAuthClient<MockKeychainProvider>) {
        let dir = TempDir::new().unwrap();
        let vault = MockKeychainProvider::new("client-tests");
        let store = TokenStore::new(vault.clone(), TokenStoreConfig::new(dir.path().to_path_buf()));
        (dir, vault, OAuthClient::new(store))
    }

    fn dc_config() -> OAuthConfig {
        // Port 9 (discard) on loopback; nothing in these tests may reach it.
        OAuthConfig::datacenter("client", "secret", "http://localhost/cb", "WRITE", "http://127.0.0.1:9")
            .unwrap()
    }

    #[test]
    fn refresh_without_refresh_token_fails_without_network() {
        let (_dir, vault, client) = test_client();
        let mut config = dc_config();
        config.access_token = Some("stale".to_string());

        assert!(!client.refresh_access_token(&mut config));
        assert_eq!(config.access_token.as_deref(), Some("stale"));
        assert!(vault.keys().is_empty());
    }

    #[test]
    fn ensure_valid_token_skips_refresh_for_fresh_token() {
        let (_dir, vault, client) = test_client();
        let mut config = dc_config();
        config.access_token = Some("fresh".to_string());
        config.refresh_token = Some("refresh".to_string());
        config.expires_at = Some(now_epoch_seconds() + 3600.0);

        assert!(client.ensure_valid_token(&mut config));
        assert_eq!(config.access_token.as_deref(), Some("fresh"));
        assert!(vault.keys().is_empty());
    }

    #[test]
    fn ensure_valid_token_fails_for_expired_token_without_refresh() {
        let (_dir, _vault, client) = test_client();
        let mut config = dc_config();
        config.access_token = Some("old".to_string());
        config.expires_at = Some(now_epoch_seconds() - 10.0);

        assert!(!client.ensure_valid_token(&mut config));
    }

    #[test]
    fn restore_tokens_applies_persisted_record() {
        let (_dir, _vault, client) = test_client();
        let mut stored = dc_config();
        stored.access_token = Some("persisted-access".to_string());
        stored.refresh_token = Some("persisted-refresh".to_string());
        stored.expires_at = Some(now_epoch_seconds() + 1800.0);
        assert!(client.store().save(&stored.storage_identity(), &stored.to_record()).any());

        let mut config = dc_config();
        assert!(client.restore_tokens(&mut config));
        assert_eq!(config.access_token.as_deref(), Some("persisted-access"));
        assert_eq!(config.refresh_token.as_deref(), Some("persisted-refresh"));
        assert!(!config.is_token_expired());
    }

    #[test]
    fn restore_tokens_requires_client_id() {
        let (_dir, _vault, client) = test_client();
        let mut config = dc_config();
        config.client_id.clear();
        assert!(!client.restore_tokens(&mut config));
    }

    #[test]
    fn datacenter_without_url_cannot_exchange() {
        let (_dir, _vault, client) = test_client();
        let mut config = dc_config();
        config.instance_url = None;
        assert!(!client.exchange_code_for_tokens(&mut config, "code"));
        assert!(config.access_token.is_none());
    }

    #[test]
    fn error_response_prefers_oauth_body() {
        let err = OAuthClientError::from_error_response(401, r#"{"error":"invalid_client"}"#.to_string());
        assert!(matches!(
            err,
            OAuthClientError::OAuthError { status: 401, ref error } if error.error == "invalid_client"
        ));

        let err = OAuthClientError::from_error_response(503, "upstream down".to_string());
        assert!(matches!(
            err,
            OAuthClientError::HttpStatus { status: 503, ref body } if body == "upstream down"
        ));
    }

    #[test]
    fn error_messages_are_descriptive() {
        let err = OAuthClientError::MissingRefreshToken { offline_access_hint: true };
        assert!(err.to_string().contains("offline_access"));

        let err = OAuthClientError::OAuthError {
            status: 400,
            error: OAuthError {
                error: "invalid_grant".to_string(),
                error_description: Some("Unknown or invalid refresh token.".to_string()),
            },
        };
        assert_eq!(
            err.to_string(),
            "OAuth error (HTTP 400): invalid_grant: Unknown or invalid refresh token."
        );

        let err = OAuthClientError::HttpStatus { status: 502, body: "x".repeat(500) };
        assert!(err.to_string().len() < 300);
    }
}
