//! OAuth 2.0 types and structures
//!
//! Configuration model for Atlassian Cloud and Data Center OAuth (3LO), the
//! persisted token record, and the typed token-endpoint response.
//!
//! Cloud uses fixed global endpoints and addresses a site by its Cloud ID.
//! Data Center derives its endpoints from the instance URL
//! (`{instance_url}/rest/oauth2/latest/...`) and has no Cloud ID.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;

use super::identity::StorageIdentity;
use crate::error::{ConfigError, ConfigResult};

/// Cloud token endpoint
pub const CLOUD_TOKEN_URL: &str = "https://auth.atlassian.com/oauth/token";
/// Cloud authorization endpoint
pub const CLOUD_AUTHORIZE_URL: &str = "https://auth.atlassian.com/authorize";
/// Cloud accessible-resources endpoint (site lookup)
pub const CLOUD_ACCESSIBLE_RESOURCES_URL: &str =
    "https://api.atlassian.com/oauth/token/accessible-resources";
/// Audience requested on Cloud authorization
pub const CLOUD_AUDIENCE: &str = "api.atlassian.com";

/// Data Center token path, appended to the instance URL
pub const DC_TOKEN_PATH: &str = "/rest/oauth2/latest/token";
/// Data Center authorization path, appended to the instance URL
pub const DC_AUTHORIZE_PATH: &str = "/rest/oauth2/latest/authorize";

/// A token expiring within this many seconds is treated as expired
pub const TOKEN_EXPIRY_MARGIN_SECS: f64 = 300.0;
/// Lifetime assumed when an authorization-code response omits `expires_in`
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Current time as fractional epoch seconds
#[must_use]
pub fn now_epoch_seconds() -> f64 {
    let now = Utc::now();
    u64::try_from(now.timestamp())
        .map_or(0.0, |secs| Duration::new(secs, now.timestamp_subsec_nanos()).as_secs_f64())
}

/// Absolute expiry for a token issued now with a lifetime of `expires_in`
/// seconds. Negative lifetimes count as already expired.
#[must_use]
pub fn expiry_from_now(expires_in: i64) -> f64 {
    now_epoch_seconds() + Duration::from_secs(expires_in.max(0).unsigned_abs()).as_secs_f64()
}

/// Render a token for logs: first five and last three characters only.
#[must_use]
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 10 {
        return "***".to_string();
    }
    let head: String = chars[..5].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{head}...{tail}")
}

/// Deployment topology of the target instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    /// Multi-tenant Atlassian Cloud
    Cloud,
    /// Self-hosted Data Center / Server
    Datacenter,
}

impl InstanceType {
    /// Lowercase name used in storage identities and records
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Datacenter => "datacenter",
        }
    }

    /// Infer the topology from a site URL: `*.atlassian.net` is Cloud.
    #[must_use]
    pub fn infer_from_url(url: &str) -> Self {
        let host = Url::parse(url.trim())
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase));
        let is_cloud = host.map_or_else(
            || url.contains("atlassian.net"),
            |host| host == "atlassian.net" || host.ends_with(".atlassian.net"),
        );
        if is_cloud {
            Self::Cloud
        } else {
            Self::Datacenter
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cloud" => Ok(Self::Cloud),
            "datacenter" | "data_center" | "data-center" | "dc" | "server" => Ok(Self::Datacenter),
            other => Err(ConfigError::UnknownInstanceType(other.to_string())),
        }
    }
}

/// Normalize a Data Center instance URL.
///
/// Trims whitespace, trailing slashes and a trailing `/wiki` segment
/// (Confluence base URLs), and checks the result is an absolute http(s) URL.
///
/// # Errors
/// Returns `ConfigError::MissingInstanceUrl` for an empty value and
/// `ConfigError::InvalidInstanceUrl` when it does not parse.
pub fn normalize_instance_url(raw: &str) -> ConfigResult<String> {
    let mut url = raw.trim().trim_end_matches('/');
    if let Some(stripped) = url.strip_suffix("/wiki") {
        url = stripped.trim_end_matches('/');
    }
    if url.is_empty() {
        return Err(ConfigError::MissingInstanceUrl);
    }

    let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidInstanceUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(ConfigError::InvalidInstanceUrl {
            url: url.to_string(),
            reason: "expected an absolute http(s) URL".to_string(),
        });
    }

    Ok(url.to_string())
}

/// Global Cloud endpoints
///
/// Defaults to Atlassian's production hosts; tests point them at a stub
/// server.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_field_names)]
pub struct CloudEndpoints {
    /// Token endpoint (code exchange and refresh)
    pub token_url: String,
    /// Authorization endpoint the user is redirected to
    pub authorize_url: String,
    /// Accessible-resources endpoint used to resolve the Cloud ID
    pub accessible_resources_url: String,
}

impl CloudEndpoints {
    /// Endpoints rooted at `base` (e.g. a stub server URI).
    #[must_use]
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            token_url: format!("{base}/oauth/token"),
            authorize_url: format!("{base}/authorize"),
            accessible_resources_url: format!("{base}/oauth/token/accessible-resources"),
        }
    }
}

impl Default for CloudEndpoints {
    fn default() -> Self {
        Self {
            token_url: CLOUD_TOKEN_URL.to_string(),
            authorize_url: CLOUD_AUTHORIZE_URL.to_string(),
            accessible_resources_url: CLOUD_ACCESSIBLE_RESOURCES_URL.to_string(),
        }
    }
}

/// OAuth 2.0 (3LO) configuration and current token state
///
/// One instance exists per process per (application, target instance) pair.
/// Client credentials are fixed at construction; `access_token`,
/// `refresh_token` and `expires_at` are mutated in place by the exchange and
/// refresh flows in [`super::client::OAuthClient`].
#[derive(Clone)]
pub struct OAuthConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Redirect URI registered for the client
    pub redirect_uri: String,
    /// Space-separated scopes
    pub scope: String,
    /// Cloud or Data Center
    pub instance_type: InstanceType,
    /// Data Center instance URL (normalized, no trailing slash)
    pub instance_url: Option<String>,
    /// Cloud site identifier
    pub cloud_id: Option<String>,
    /// Current access token
    pub access_token: Option<String>,
    /// Current refresh token
    pub refresh_token: Option<String>,
    /// Access token expiry, fractional epoch seconds
    pub expires_at: Option<f64>,
    /// Cloud endpoints (ignored for Data Center)
    pub cloud_endpoints: CloudEndpoints,
}

impl OAuthConfig {
    /// Create a configuration for either topology.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingInstanceUrl` or
    /// `ConfigError::InvalidInstanceUrl` when `instance_type` is Data Center
    /// and `instance_url` is absent or malformed.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        scope: impl Into<String>,
        instance_type: InstanceType,
        instance_url: Option<String>,
        cloud_id: Option<String>,
    ) -> ConfigResult<Self> {
        let instance_url = match instance_type {
            InstanceType::Datacenter => {
                let raw = instance_url.ok_or(ConfigError::MissingInstanceUrl)?;
                Some(normalize_instance_url(&raw)?)
            }
            InstanceType::Cloud => None,
        };

        Ok(Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scope: scope.into(),
            instance_type,
            instance_url,
            cloud_id: cloud_id.filter(|id| !id.trim().is_empty()),
            access_token: None,
            refresh_token: None,
            expires_at: None,
            cloud_endpoints: CloudEndpoints::default(),
        })
    }

    /// Cloud configuration; the Cloud ID is resolved after code exchange
    /// unless supplied with [`OAuthConfig::with_cloud_id`].
    #[must_use]
    pub fn cloud(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scope: scope.into(),
            instance_type: InstanceType::Cloud,
            instance_url: None,
            cloud_id: None,
            access_token: None,
            refresh_token: None,
            expires_at: None,
            cloud_endpoints: CloudEndpoints::default(),
        }
    }

    /// Data Center configuration for the instance at `instance_url`.
    ///
    /// # Errors
    /// Fails immediately when `instance_url` is empty or malformed.
    pub fn datacenter(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        scope: impl Into<String>,
        instance_url: impl Into<String>,
    ) -> ConfigResult<Self> {
        Self::new(
            client_id,
            client_secret,
            redirect_uri,
            scope,
            InstanceType::Datacenter,
            Some(instance_url.into()),
            None,
        )
    }

    /// Pre-supply the Cloud site to use.
    #[must_use]
    pub fn with_cloud_id(mut self, cloud_id: impl Into<String>) -> Self {
        let cloud_id = cloud_id.into();
        self.cloud_id = (!cloud_id.trim().is_empty()).then_some(cloud_id);
        self
    }

    /// Replace the global Cloud endpoints.
    #[must_use]
    pub fn with_cloud_endpoints(mut self, endpoints: CloudEndpoints) -> Self {
        self.cloud_endpoints = endpoints;
        self
    }

    /// Whether this configuration targets Atlassian Cloud
    #[must_use]
    pub fn is_cloud(&self) -> bool {
        self.instance_type == InstanceType::Cloud
    }

    /// Whether this configuration targets a Data Center instance
    #[must_use]
    pub fn is_datacenter(&self) -> bool {
        self.instance_type == InstanceType::Datacenter
    }

    /// Whether the access token is missing, has no expiry, or expires within
    /// the five-minute margin.
    #[must_use]
    pub fn is_token_expired(&self) -> bool {
        self.is_token_expired_at(now_epoch_seconds())
    }

    /// [`OAuthConfig::is_token_expired`] evaluated at `now` (epoch seconds).
    #[must_use]
    pub fn is_token_expired_at(&self, now: f64) -> bool {
        let has_token = self.access_token.as_deref().is_some_and(|t| !t.is_empty());
        match (has_token, self.expires_at) {
            (true, Some(expires_at)) => now + TOKEN_EXPIRY_MARGIN_SECS >= expires_at,
            _ => true,
        }
    }

    /// Seconds until the access token expires, if an expiry is known
    #[must_use]
    pub fn seconds_until_expiry(&self) -> Option<f64> {
        self.expires_at.map(|expires_at| expires_at - now_epoch_seconds())
    }

    /// Token endpoint for this topology
    ///
    /// # Errors
    /// Returns `ConfigError::MissingInstanceUrl` for Data Center without an
    /// instance URL.
    pub fn token_url(&self) -> ConfigResult<String> {
        match self.instance_type {
            InstanceType::Cloud => Ok(self.cloud_endpoints.token_url.clone()),
            InstanceType::Datacenter => Ok(format!("{}{}", self.instance_base()?, DC_TOKEN_PATH)),
        }
    }

    /// Authorization endpoint (without query) for this topology
    ///
    /// # Errors
    /// Returns `ConfigError::MissingInstanceUrl` for Data Center without an
    /// instance URL.
    pub fn authorize_url_base(&self) -> ConfigResult<String> {
        match self.instance_type {
            InstanceType::Cloud => Ok(self.cloud_endpoints.authorize_url.clone()),
            InstanceType::Datacenter => {
                Ok(format!("{}{}", self.instance_base()?, DC_AUTHORIZE_PATH))
            }
        }
    }

    /// Authorization URL the user is sent to for consent.
    ///
    /// Cloud additionally requests the `api.atlassian.com` audience and forces
    /// the consent prompt.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingInstanceUrl` for Data Center without an
    /// instance URL.
    pub fn get_authorization_url(&self, state: &str) -> ConfigResult<String> {
        let base = self.authorize_url_base()?;

        let mut params: Vec<(&str, &str)> = Vec::with_capacity(7);
        if self.is_cloud() {
            params.push(("audience", CLOUD_AUDIENCE));
        }
        params.extend([
            ("client_id", self.client_id.as_str()),
            ("scope", self.scope.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "code"),
        ]);
        if self.is_cloud() {
            params.push(("prompt", "consent"));
        }
        params.push(("state", state));

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!("{base}?{query_string}"))
    }

    /// Scoped storage identity of this configuration's token record
    #[must_use]
    pub fn storage_identity(&self) -> StorageIdentity {
        StorageIdentity::derive(
            &self.client_id,
            self.instance_type,
            self.instance_url.as_deref(),
            self.cloud_id.as_deref(),
        )
    }

    /// Snapshot of the persisted fields
    #[must_use]
    pub fn to_record(&self) -> StorageRecord {
        StorageRecord {
            refresh_token: self.refresh_token.clone(),
            access_token: self.access_token.clone(),
            expires_at: self.expires_at,
            cloud_id: self.cloud_id.clone(),
            instance_type: Some(self.instance_type),
            instance_url: self.instance_url.clone(),
        }
    }

    /// Apply a loaded record: tokens and expiry always; Cloud ID and instance
    /// URL only where this configuration has none.
    pub fn apply_record(&mut self, record: &StorageRecord) {
        self.access_token.clone_from(&record.access_token);
        self.refresh_token.clone_from(&record.refresh_token);
        self.expires_at = record.expires_at;
        if self.cloud_id.is_none() {
            self.cloud_id = record.cloud_id.clone().filter(|id| !id.is_empty());
        }
        if self.instance_url.is_none() && self.is_datacenter() {
            self.instance_url.clone_from(&record.instance_url);
        }
    }

    /// Derive a configuration carrying a caller-supplied access token (for
    /// example one forwarded in a request header) for the same site.
    ///
    /// The result has no refresh token and no expiry, so session
    /// configuration attaches it as-is.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingCloudId` for Cloud without a known site,
    /// `ConfigError::MissingInstanceUrl` for Data Center without a URL, and
    /// `ConfigError::MissingValue` for an empty token.
    pub fn with_user_token(&self, access_token: impl Into<String>) -> ConfigResult<Self> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(ConfigError::MissingValue("access_token".to_string()));
        }
        match self.instance_type {
            InstanceType::Cloud if self.cloud_id.is_none() => {
                return Err(ConfigError::MissingCloudId)
            }
            InstanceType::Datacenter => {
                self.instance_base()?;
            }
            InstanceType::Cloud => {}
        }

        Ok(Self {
            access_token: Some(access_token),
            refresh_token: None,
            expires_at: None,
            ..self.clone()
        })
    }

    fn instance_base(&self) -> ConfigResult<&str> {
        self.instance_url
            .as_deref()
            .map(|url| url.trim_end_matches('/'))
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingInstanceUrl)
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("scope", &self.scope)
            .field("instance_type", &self.instance_type)
            .field("instance_url", &self.instance_url)
            .field("cloud_id", &self.cloud_id)
            .field("access_token", &self.access_token.as_deref().map(mask_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(mask_token))
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Pre-issued ("bring your own") Cloud access token
///
/// Never refreshes: there is no refresh token and no expiry, and the caller
/// is trusted to supply a live token.
#[derive(Clone)]
pub struct BYOAccessTokenOAuthConfig {
    /// Cloud site identifier
    pub cloud_id: String,
    /// Access token attached verbatim
    pub access_token: String,
}

impl BYOAccessTokenOAuthConfig {
    /// Create a BYO configuration for the Cloud site `cloud_id`.
    #[must_use]
    pub fn new(cloud_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self { cloud_id: cloud_id.into(), access_token: access_token.into() }
    }

    /// Always Cloud
    #[must_use]
    pub const fn instance_type(&self) -> InstanceType {
        InstanceType::Cloud
    }

    /// Always `None`
    #[must_use]
    pub const fn refresh_token(&self) -> Option<&str> {
        None
    }

    /// Always `None`
    #[must_use]
    pub const fn expires_at(&self) -> Option<f64> {
        None
    }
}

impl fmt::Debug for BYOAccessTokenOAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BYOAccessTokenOAuthConfig")
            .field("cloud_id", &self.cloud_id)
            .field("access_token", &mask_token(&self.access_token))
            .finish()
    }
}

/// Persisted token record
///
/// Serialized as one JSON object per storage identity, both in the vault and
/// in `~/.mcp-atlassian/<storage_id>.json`. Records written by the unscoped
/// scheme used `base_url` and carried no `instance_type`; both shapes load.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageRecord {
    /// Refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token
    #[serde(default)]
    pub access_token: Option<String>,
    /// Expiry, fractional epoch seconds
    #[serde(default)]
    pub expires_at: Option<f64>,
    /// Cloud site identifier
    #[serde(default)]
    pub cloud_id: Option<String>,
    /// Topology the record was issued for
    #[serde(default)]
    pub instance_type: Option<InstanceType>,
    /// Data Center instance URL
    #[serde(default, alias = "base_url")]
    pub instance_url: Option<String>,
}

impl StorageRecord {
    /// Topology of the record, inferring it for unscoped records: a record
    /// carrying a non-Cloud URL was written for Data Center.
    #[must_use]
    pub fn effective_instance_type(&self) -> InstanceType {
        self.instance_type.unwrap_or_else(|| {
            self.instance_url
                .as_deref()
                .filter(|url| !url.is_empty())
                .map_or(InstanceType::Cloud, InstanceType::infer_from_url)
        })
    }

    /// Whether this record may belong to the given instance.
    ///
    /// Missing fields on either side are treated as compatible; only a
    /// positive conflict (different topology, URL, or Cloud ID) rejects.
    #[must_use]
    pub fn matches_instance(
        &self,
        instance_type: InstanceType,
        instance_url: Option<&str>,
        cloud_id: Option<&str>,
    ) -> bool {
        if self.effective_instance_type() != instance_type {
            return false;
        }
        match instance_type {
            InstanceType::Datacenter => match (self.instance_url.as_deref(), instance_url) {
                (Some(stored), Some(wanted)) => {
                    stored.trim_end_matches('/').eq_ignore_ascii_case(wanted.trim_end_matches('/'))
                }
                _ => true,
            },
            InstanceType::Cloud => match (self.cloud_id.as_deref(), cloud_id) {
                (Some(stored), Some(wanted)) if !stored.is_empty() => stored == wanted,
                _ => true,
            },
        }
    }
}

impl fmt::Debug for StorageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageRecord")
            .field("access_token", &self.access_token.as_deref().map(mask_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(mask_token))
            .field("expires_at", &self.expires_at)
            .field("cloud_id", &self.cloud_id)
            .field("instance_type", &self.instance_type)
            .field("instance_url", &self.instance_url)
            .finish()
    }
}

/// Token endpoint response (RFC 6749 §5.1)
///
/// `access_token` is required at the decode boundary; the rest are validated
/// by the flow that consumes them (code exchange requires `refresh_token`,
/// refresh requires `expires_in`).
#[derive(Deserialize)]
pub struct TokenResponse {
    /// Issued access token
    pub access_token: String,
    /// Issued or rotated refresh token
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Token type, normally `Bearer`
    #[serde(default)]
    pub token_type: Option<String>,
    /// Granted scopes
    #[serde(default)]
    pub scope: Option<String>,
}

/// OAuth error response from the authorization server (RFC 6749 §5.2)
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthError {
    /// Error code, e.g. `invalid_grant`
    pub error: String,
    /// Human-readable detail
    #[serde(default)]
    pub error_description: Option<String>,
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.error)?;
        if let Some(desc) = &self.error_description {
            write!(f, ": {desc}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_counts_from_issue_time() {
        let before = now_epoch_seconds();
        assert!(before > 1_700_000_000.0);

        let expires_at = expiry_from_now(3600);
        assert!(expires_at >= before + 3600.0);
        assert!(expires_at < before + 3660.0);
        assert!(expiry_from_now(-30) <= now_epoch_seconds());
    }

    fn dc_config() -> OAuthConfig {
        OAuthConfig::datacenter(
            "dc-client",
            "dc-secret",
            "http://localhost:8080/callback",
            "WRITE",
            "https://jira.example.com/",
        )
        .unwrap()
    }

    #[test]
    fn new_config_is_expired_before_any_token() {
        let cloud = OAuthConfig::cloud("id", "secret", "http://localhost/cb", "read:jira-work");
        assert!(cloud.is_token_expired());
        assert!(dc_config().is_token_expired());
    }

    #[test]
    fn expiry_margin_boundary() {
        let mut config = dc_config();
        config.access_token = Some("token".to_string());
        let now = 1_700_000_000.0;

        config.expires_at = Some(now + 301.0);
        assert!(!config.is_token_expired_at(now));

        config.expires_at = Some(now + 299.0);
        assert!(config.is_token_expired_at(now));

        config.expires_at = Some(now + 300.0);
        assert!(config.is_token_expired_at(now));
    }

    #[test]
    fn expiry_without_access_token_is_expired() {
        let mut config = dc_config();
        config.expires_at = Some(now_epoch_seconds() + 3600.0);
        assert!(config.is_token_expired());

        config.access_token = Some("token".to_string());
        assert!(!config.is_token_expired());

        config.expires_at = None;
        assert!(config.is_token_expired());
    }

    #[test]
    fn datacenter_requires_instance_url() {
        let err = OAuthConfig::new(
            "id",
            "secret",
            "http://localhost/cb",
            "",
            InstanceType::Datacenter,
            None,
            None,
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::MissingInstanceUrl);

        let err = OAuthConfig::datacenter("id", "secret", "http://localhost/cb", "", "  ")
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingInstanceUrl);
    }

    #[test]
    fn datacenter_url_computation_fails_without_url() {
        let mut config = dc_config();
        config.instance_url = None;
        assert_eq!(config.token_url(), Err(ConfigError::MissingInstanceUrl));
        assert_eq!(config.authorize_url_base(), Err(ConfigError::MissingInstanceUrl));
        assert!(config.get_authorization_url("state").is_err());
    }

    #[test]
    fn endpoints_follow_topology() {
        let dc = dc_config();
        assert_eq!(dc.token_url().unwrap(), "https://jira.example.com/rest/oauth2/latest/token");
        assert_eq!(
            dc.authorize_url_base().unwrap(),
            "https://jira.example.com/rest/oauth2/latest/authorize"
        );

        let cloud = OAuthConfig::cloud("id", "secret", "http://localhost/cb", "read:jira-work");
        assert_eq!(cloud.token_url().unwrap(), CLOUD_TOKEN_URL);
        assert_eq!(cloud.authorize_url_base().unwrap(), CLOUD_AUTHORIZE_URL);
    }

    #[test]
    fn cloud_authorization_url_requests_audience_and_consent() {
        let config = OAuthConfig::cloud(
            "client",
            "secret",
            "http://localhost:8080/callback",
            "read:jira-work offline_access",
        );
        let url = config.get_authorization_url("xyz").unwrap();

        assert!(url.starts_with("https://auth.atlassian.com/authorize?"));
        assert!(url.contains("audience=api.atlassian.com"));
        assert!(url.contains("client_id=client"));
        assert!(url.contains("scope=read%3Ajira-work%20offline_access"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080%2Fcallback"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("prompt=consent"));
        assert!(url.ends_with("state=xyz"));
    }

    #[test]
    fn datacenter_authorization_url_has_no_cloud_parameters() {
        let url = dc_config().get_authorization_url("abc").unwrap();
        assert!(url.starts_with("https://jira.example.com/rest/oauth2/latest/authorize?"));
        assert!(!url.contains("audience="));
        assert!(!url.contains("prompt="));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("state=abc"));
    }

    #[test]
    fn instance_url_is_normalized() {
        assert_eq!(
            normalize_instance_url("https://wiki.example.com/wiki/").unwrap(),
            "https://wiki.example.com"
        );
        assert_eq!(
            normalize_instance_url(" https://jira.example.com/jira// ").unwrap(),
            "https://jira.example.com/jira"
        );
        assert!(matches!(
            normalize_instance_url("jira.example.com"),
            Err(ConfigError::InvalidInstanceUrl { .. })
        ));
        assert!(matches!(
            normalize_instance_url("ftp://jira.example.com"),
            Err(ConfigError::InvalidInstanceUrl { .. })
        ));
    }

    #[test]
    fn instance_type_parsing_and_inference() {
        assert_eq!("Cloud".parse::<InstanceType>().unwrap(), InstanceType::Cloud);
        assert_eq!("server".parse::<InstanceType>().unwrap(), InstanceType::Datacenter);
        assert_eq!("dc".parse::<InstanceType>().unwrap(), InstanceType::Datacenter);
        assert!("mainframe".parse::<InstanceType>().is_err());

        assert_eq!(InstanceType::infer_from_url("https://acme.atlassian.net"), InstanceType::Cloud);
        assert_eq!(
            InstanceType::infer_from_url("https://jira.acme.internal"),
            InstanceType::Datacenter
        );
    }

    #[test]
    fn user_token_config_drops_refresh_state() {
        let mut base = OAuthConfig::cloud("id", "secret", "http://localhost/cb", "read:jira-work");
        assert_eq!(base.with_user_token("user-token").unwrap_err(), ConfigError::MissingCloudId);

        base = base.with_cloud_id("site-1");
        base.refresh_token = Some("refresh".to_string());
        base.expires_at = Some(1.0);

        let user = base.with_user_token("user-token").unwrap();
        assert_eq!(user.access_token.as_deref(), Some("user-token"));
        assert_eq!(user.refresh_token, None);
        assert_eq!(user.expires_at, None);
        assert_eq!(user.cloud_id.as_deref(), Some("site-1"));
        assert_eq!(user.client_id, "id");
    }

    #[test]
    fn apply_record_keeps_configured_site() {
        let mut config = OAuthConfig::cloud("id", "secret", "http://localhost/cb", "scope")
            .with_cloud_id("configured");
        let record = StorageRecord {
            access_token: Some("a".to_string()),
            refresh_token: Some("r".to_string()),
            expires_at: Some(42.0),
            cloud_id: Some("stored".to_string()),
            instance_type: Some(InstanceType::Cloud),
            instance_url: None,
        };

        config.apply_record(&record);
        assert_eq!(config.access_token.as_deref(), Some("a"));
        assert_eq!(config.refresh_token.as_deref(), Some("r"));
        assert_eq!(config.expires_at, Some(42.0));
        assert_eq!(config.cloud_id.as_deref(), Some("configured"));
    }

    #[test]
    fn legacy_record_shape_deserializes() {
        let legacy = r#"{"refresh_token":"r","access_token":"a","expires_at":1700000000.5,
            "cloud_id":null,"base_url":"https://jira.example.com"}"#;
        let record: StorageRecord = serde_json::from_str(legacy).unwrap();

        assert_eq!(record.instance_url.as_deref(), Some("https://jira.example.com"));
        assert_eq!(record.instance_type, None);
        assert_eq!(record.effective_instance_type(), InstanceType::Datacenter);
        assert!(record.matches_instance(
            InstanceType::Datacenter,
            Some("https://jira.example.com"),
            None
        ));
        assert!(!record.matches_instance(
            InstanceType::Datacenter,
            Some("https://other.example.com"),
            None
        ));
        assert!(!record.matches_instance(InstanceType::Cloud, None, Some("site")));
    }

    #[test]
    fn record_serializes_every_key() {
        let json = serde_json::to_value(StorageRecord::default()).unwrap();
        for key in
            ["refresh_token", "access_token", "expires_at", "cloud_id", "instance_type", "instance_url"]
        {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = dc_config();
        config.access_token = Some("abcdefghijklmnopqrstuvwxyz".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("dc-secret"));
        assert!(!rendered.contains("abcdefghijklmnopqrstuvwxyz"));
        assert!(rendered.contains("abcde...xyz"));
    }

    #[test]
    fn short_tokens_are_fully_masked() {
        assert_eq!(mask_token("short"), "***");
    }
}
