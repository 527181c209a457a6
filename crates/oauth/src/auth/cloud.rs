//! Cloud site resolution
//!
//! After a Cloud code exchange the gateway still needs the site's Cloud ID
//! to build API URLs. The accessible-resources endpoint lists every site the
//! token can reach; the first one is used.

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::client::OAuthClientError;
use super::types::CloudEndpoints;

/// One entry of the accessible-resources response
#[derive(Debug, Clone, Deserialize)]
pub struct AccessibleResource {
    /// Cloud ID of the site
    pub id: String,
    /// Site display name
    #[serde(default)]
    pub name: Option<String>,
    /// Site URL, e.g. `https://acme.atlassian.net`
    #[serde(default)]
    pub url: Option<String>,
    /// Scopes granted on this site
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Resolves the Cloud ID reachable with an access token
#[derive(Debug, Clone)]
pub struct CloudIdResolver {
    http: Client,
    accessible_resources_url: String,
}

impl CloudIdResolver {
    /// Resolver querying `accessible_resources_url` with `http`.
    #[must_use]
    pub fn new(http: Client, accessible_resources_url: impl Into<String>) -> Self {
        Self { http, accessible_resources_url: accessible_resources_url.into() }
    }

    /// Resolver for the configured Cloud endpoints.
    #[must_use]
    pub fn from_endpoints(http: Client, endpoints: &CloudEndpoints) -> Self {
        Self::new(http, endpoints.accessible_resources_url.clone())
    }

    /// Cloud ID of the first accessible site.
    ///
    /// Returns `None` for an empty token, a failed request, or an empty site
    /// list; failures are logged, never raised. With several sites the first
    /// is used, so callers that need a specific site must configure its
    /// Cloud ID up front.
    #[must_use]
    pub fn resolve(&self, access_token: &str) -> Option<String> {
        if access_token.is_empty() {
            debug!("Skipping Cloud ID lookup: no access token");
            return None;
        }

        let resources = match self.fetch_resources(access_token) {
            Ok(resources) => resources,
            Err(e) => {
                warn!(error = %e, "Failed to fetch accessible Atlassian resources");
                return None;
            }
        };

        let Some(first) = resources.first() else {
            warn!("No accessible Atlassian resources found for this token");
            return None;
        };

        if resources.len() > 1 {
            warn!(
                count = resources.len(),
                cloud_id = %first.id,
                site = first.url.as_deref().unwrap_or_default(),
                "Token can access multiple Atlassian sites; using the first. \
                 Configure a cloud_id to select a specific site"
            );
        } else {
            info!(
                cloud_id = %first.id,
                site = first.url.as_deref().unwrap_or_default(),
                "Resolved Atlassian Cloud ID"
            );
        }

        Some(first.id.clone())
    }

    /// Fetch the site list.
    ///
    /// # Errors
    /// Returns `OAuthClientError::RequestFailed` on transport failure,
    /// `OAuthClientError::HttpStatus` or `OAuthClientError::OAuthError` on a
    /// non-2xx status, and `OAuthClientError::ParseError` on a malformed body.
    pub fn fetch_resources(
        &self,
        access_token: &str,
    ) -> Result<Vec<AccessibleResource>, OAuthClientError> {
        let response = self
            .http
            .get(&self.accessible_resources_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(OAuthClientError::from_error_response(status.as_u16(), body));
        }

        serde_json::from_str(&body).map_err(|e| OAuthClientError::ParseError(e.to_string()))
    }
}
