//! Credential resolution from environment-style inputs
//!
//! Every variable is looked up under a service-specific prefix first (for
//! example `JIRA_OAUTH_CLIENT_ID`) and then under the shared
//! `ATLASSIAN_OAUTH_` prefix, so services can share one OAuth application or
//! use their own.
//!
//! Precedence between credential shapes:
//!
//! 1. BYO: an access token (Cloud with a Cloud ID, or Data Center with an
//!    instance URL)
//! 2. Full: client ID and secret, plus redirect URI and scope (both optional
//!    for Data Center)
//! 3. Minimal: `*_ENABLE` set, tokens supplied per request

use std::collections::HashMap;
use std::hash::BuildHasher;

use tracing::{debug, info};

use super::types::{normalize_instance_url, BYOAccessTokenOAuthConfig, InstanceType, OAuthConfig};
use crate::error::{ConfigError, ConfigResult};

/// Shared prefix consulted after the service-specific one
pub const SHARED_PREFIX: &str = "ATLASSIAN_OAUTH_";
/// Redirect URI assumed for Data Center when none is configured
pub const DEFAULT_DC_REDIRECT_URI: &str = "http://localhost:8080/callback";

const CLIENT_ID: &str = "CLIENT_ID";
const CLIENT_SECRET: &str = "CLIENT_SECRET";
const REDIRECT_URI: &str = "REDIRECT_URI";
const SCOPE: &str = "SCOPE";
const INSTANCE_TYPE: &str = "INSTANCE_TYPE";
const INSTANCE_URL: &str = "INSTANCE_URL";
const CLOUD_ID: &str = "CLOUD_ID";
const ACCESS_TOKEN: &str = "ACCESS_TOKEN";
const ENABLE: &str = "ENABLE";

/// Source of configuration variables
pub trait EnvSource {
    /// Value of `key`, or `None` if unset or blank
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

impl<S: BuildHasher> EnvSource for HashMap<String, String, S> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.trim().is_empty()).cloned()
    }
}

/// Variable prefixes for one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEnvPrefix {
    service: Option<String>,
    shared: String,
}

impl OAuthEnvPrefix {
    /// Shared `ATLASSIAN_OAUTH_` prefix only
    #[must_use]
    pub fn shared() -> Self {
        Self { service: None, shared: SHARED_PREFIX.to_string() }
    }

    /// `<SERVICE>_OAUTH_` first, then `ATLASSIAN_OAUTH_`.
    #[must_use]
    pub fn service(service: &str) -> Self {
        Self {
            service: Some(format!("{}_OAUTH_", service.trim().to_ascii_uppercase())),
            shared: SHARED_PREFIX.to_string(),
        }
    }

    /// Explicit prefixes.
    #[must_use]
    pub fn custom(service: Option<String>, shared: impl Into<String>) -> Self {
        Self { service, shared: shared.into() }
    }

    /// Look up `suffix`, service prefix first.
    #[must_use]
    pub fn lookup(&self, env: &(impl EnvSource + ?Sized), suffix: &str) -> Option<String> {
        self.service
            .as_deref()
            .and_then(|prefix| env.var(&format!("{prefix}{suffix}")))
            .or_else(|| env.var(&format!("{}{suffix}", self.shared)))
    }

    fn flag(&self, env: &(impl EnvSource + ?Sized), suffix: &str) -> bool {
        self.lookup(env, suffix).is_some_and(|v| parse_bool(&v))
    }
}

impl Default for OAuthEnvPrefix {
    fn default() -> Self {
        Self::shared()
    }
}

/// Accepts `1`, `true`, `yes`, `on` (case-insensitive)
fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Resolved credential shape
#[derive(Debug, Clone)]
pub enum OAuthCredentials {
    /// Pre-issued Cloud access token; never refreshed
    Byo(BYOAccessTokenOAuthConfig),
    /// Client credentials able to exchange and refresh
    Full(OAuthConfig),
    /// No client credentials; tokens are supplied per request (or, for Data
    /// Center, a configured access token without refresh)
    Minimal(OAuthConfig),
}

impl OAuthCredentials {
    /// Current access token
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        match self {
            Self::Byo(byo) => Some(byo.access_token.as_str()),
            Self::Full(config) | Self::Minimal(config) => config.access_token.as_deref(),
        }
    }

    /// Current refresh token
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        match self {
            Self::Byo(byo) => byo.refresh_token(),
            Self::Full(config) | Self::Minimal(config) => config.refresh_token.as_deref(),
        }
    }

    /// Cloud site identifier, if known
    #[must_use]
    pub fn cloud_id(&self) -> Option<&str> {
        match self {
            Self::Byo(byo) => Some(byo.cloud_id.as_str()),
            Self::Full(config) | Self::Minimal(config) => config.cloud_id.as_deref(),
        }
    }

    /// Topology
    #[must_use]
    pub const fn instance_type(&self) -> InstanceType {
        match self {
            Self::Byo(byo) => byo.instance_type(),
            Self::Full(config) | Self::Minimal(config) => config.instance_type,
        }
    }

    /// Mutable access to the refreshable configuration, if any
    pub fn oauth_config_mut(&mut self) -> Option<&mut OAuthConfig> {
        match self {
            Self::Byo(_) => None,
            Self::Full(config) | Self::Minimal(config) => Some(config),
        }
    }
}

impl From<OAuthConfig> for OAuthCredentials {
    fn from(config: OAuthConfig) -> Self {
        Self::Full(config)
    }
}

impl From<BYOAccessTokenOAuthConfig> for OAuthCredentials {
    fn from(byo: BYOAccessTokenOAuthConfig) -> Self {
        Self::Byo(byo)
    }
}

/// Resolve credentials for one service.
///
/// `service_url` (for example the Jira or Confluence base URL) is used when
/// no `*_INSTANCE_URL` is set; it also drives topology inference when
/// `*_INSTANCE_TYPE` is absent. Returns `Ok(None)` when no OAuth input is
/// present. Persisted tokens are not loaded here; see
/// [`super::client::OAuthClient::restore_tokens`].
///
/// # Errors
/// Returns `ConfigError` for an unknown instance type, or a Data Center
/// topology without a usable instance URL.
pub fn resolve_oauth_credentials(
    env: &(impl EnvSource + ?Sized),
    prefix: &OAuthEnvPrefix,
    service_url: Option<&str>,
) -> ConfigResult<Option<OAuthCredentials>> {
    let client_id = prefix.lookup(env, CLIENT_ID);
    let client_secret = prefix.lookup(env, CLIENT_SECRET);
    let access_token = prefix.lookup(env, ACCESS_TOKEN);
    let enabled = prefix.flag(env, ENABLE);

    if client_id.is_none() && access_token.is_none() && !enabled {
        debug!("No OAuth configuration present");
        return Ok(None);
    }

    let raw_url = prefix
        .lookup(env, INSTANCE_URL)
        .or_else(|| service_url.map(str::to_string).filter(|u| !u.trim().is_empty()));
    let instance_type = prefix.lookup(env, INSTANCE_TYPE).map_or_else(
        || Ok(raw_url.as_deref().map_or(InstanceType::Cloud, InstanceType::infer_from_url)),
        |value| value.parse::<InstanceType>(),
    )?;
    let instance_url = match instance_type {
        InstanceType::Datacenter => {
            let raw = raw_url.ok_or(ConfigError::MissingInstanceUrl)?;
            Some(normalize_instance_url(&raw)?)
        }
        InstanceType::Cloud => None,
    };
    let cloud_id = prefix.lookup(env, CLOUD_ID);

    if let Some(token) = access_token {
        match instance_type {
            InstanceType::Cloud => {
                if let Some(cloud_id) = cloud_id.clone() {
                    info!(cloud_id = %cloud_id, "Using pre-issued OAuth access token");
                    return Ok(Some(OAuthCredentials::Byo(BYOAccessTokenOAuthConfig::new(
                        cloud_id, token,
                    ))));
                }
                debug!("Access token configured without a Cloud ID; ignoring it");
            }
            InstanceType::Datacenter => {
                let mut config = OAuthConfig::new(
                    client_id.unwrap_or_default(),
                    client_secret.unwrap_or_default(),
                    "",
                    "",
                    instance_type,
                    instance_url,
                    None,
                )?;
                config.access_token = Some(token);
                info!(
                    instance_url = config.instance_url.as_deref().unwrap_or_default(),
                    "Using pre-issued OAuth access token for Data Center"
                );
                return Ok(Some(OAuthCredentials::Minimal(config)));
            }
        }
    }

    let is_dc = instance_type == InstanceType::Datacenter;
    let redirect_uri = prefix
        .lookup(env, REDIRECT_URI)
        .or_else(|| is_dc.then(|| DEFAULT_DC_REDIRECT_URI.to_string()));
    let scope = prefix.lookup(env, SCOPE).or_else(|| is_dc.then(String::new));

    if let (Some(client_id), Some(client_secret), Some(redirect_uri), Some(scope)) =
        (client_id, client_secret, redirect_uri, scope)
    {
        let config = OAuthConfig::new(
            client_id,
            client_secret,
            redirect_uri,
            scope,
            instance_type,
            instance_url,
            cloud_id,
        )?;
        info!(
            client_id = %config.client_id,
            instance_type = %config.instance_type,
            "Resolved OAuth client configuration"
        );
        return Ok(Some(OAuthCredentials::Full(config)));
    }

    if enabled {
        info!(instance_type = %instance_type, "OAuth enabled for user-provided tokens");
        let config = OAuthConfig::new("", "", "", "", instance_type, instance_url, cloud_id)?;
        return Ok(Some(OAuthCredentials::Minimal(config)));
    }

    debug!("Incomplete OAuth configuration; OAuth disabled");
    Ok(None)
}
