//! Attaching bearer credentials to an outgoing HTTP session
//!
//! The gateway's HTTP layer only has to expose a header map; this module
//! decides whether a token can be attached as-is (pre-issued tokens) or must
//! first be validated and refreshed.

use reqwest::header::{HeaderMap, HeaderValue, InvalidHeaderValue, AUTHORIZATION};
use tracing::{debug, error, info};

use super::client::OAuthClient;
use super::env::OAuthCredentials;
use super::traits::SecretVault;
use super::types::OAuthConfig;

/// Anything that carries default headers for outgoing requests
pub trait BearerSession {
    /// Set `Authorization: Bearer <token>`, replacing any previous value.
    ///
    /// # Errors
    /// Returns `InvalidHeaderValue` if the token contains characters not
    /// allowed in a header value.
    fn set_bearer_token(&mut self, token: &str) -> Result<(), InvalidHeaderValue>;
}

impl BearerSession for HeaderMap {
    fn set_bearer_token(&mut self, token: &str) -> Result<(), InvalidHeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))?;
        value.set_sensitive(true);
        self.insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// Attach OAuth credentials to `session`.
///
/// Pre-issued tokens (a BYO configuration, or any configuration with an
/// access token and no refresh token) are attached without a network call.
/// Otherwise the token is refreshed if expired first. Returns `false`, with
/// the session left untouched, when no valid token can be produced.
pub fn configure_oauth_session<S, V>(
    session: &mut S,
    credentials: &mut OAuthCredentials,
    client: &OAuthClient<V>,
) -> bool
where
    S: BearerSession + ?Sized,
    V: SecretVault,
{
    match credentials {
        OAuthCredentials::Byo(byo) => {
            if byo.access_token.is_empty() {
                error!(cloud_id = %byo.cloud_id, "BYO OAuth configuration has an empty access token");
                return false;
            }
            debug!(cloud_id = %byo.cloud_id, "Attaching pre-issued access token");
            attach(session, &byo.access_token)
        }
        OAuthCredentials::Full(config) | OAuthCredentials::Minimal(config) => {
            configure_config_session(session, config, client)
        }
    }
}

fn configure_config_session<S, V>(
    session: &mut S,
    config: &mut OAuthConfig,
    client: &OAuthClient<V>,
) -> bool
where
    S: BearerSession + ?Sized,
    V: SecretVault,
{
    let has_access = config.access_token.as_deref().is_some_and(|t| !t.is_empty());
    let has_refresh = config.refresh_token.as_deref().is_some_and(|t| !t.is_empty());

    if has_access && !has_refresh {
        debug!(
            instance_type = %config.instance_type,
            "Attaching supplied access token without refresh"
        );
        return config.access_token.as_deref().is_some_and(|token| attach(session, token));
    }

    if !client.ensure_valid_token(config) {
        error!(
            client_id = %config.client_id,
            instance_type = %config.instance_type,
            token_expired = config.is_token_expired(),
            has_refresh_token = has_refresh,
            "Could not obtain a valid OAuth access token"
        );
        return false;
    }

    let Some(token) = config.access_token.as_deref().filter(|t| !t.is_empty()) else {
        error!(client_id = %config.client_id, "Token refresh produced no access token");
        return false;
    };
    info!(client_id = %config.client_id, "Configured OAuth session");
    attach(session, token)
}

fn attach<S: BearerSession + ?Sized>(session: &mut S, token: &str) -> bool {
    session
        .set_bearer_token(token)
        .inspect_err(|e| error!(error = %e, "Access token is not a valid header value"))
        .is_ok()
}
