//! HTTP client construction and the OAuth2 client-credentials token
//! provider.
//!
//! The provider posts a form-encoded client-credentials grant to a token
//! endpoint, caches the issued bearer token together with its expiry, and
//! serializes refreshes so that concurrent callers share a single network
//! round-trip per expiry cycle.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use postmortem_types::{ReportError, RestApiReporter, TokenProvider};

/// Tokens within this margin of their expiry are refreshed eagerly so a
/// request never goes out with a credential about to lapse mid-flight.
const REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Token lifetime assumed when the endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Connect timeout for the default client used when the caller does not
/// supply one.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a `reqwest::Client` with the defaults shared by the resolvers and
/// the token provider.
pub fn build_http_client() -> Result<Client, ReportError> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .build()
        .map_err(|error| ReportError::network(format!("could not build the HTTP client: {error}")))
}

/// Wire shape of a token-endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<i64>,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    scope: Option<String>,
}

#[derive(Debug)]
struct TokenCache {
    cached_token: Option<String>,
    expiry: DateTime<Utc>,
}

/// OAuth2 client-credentials token provider with a mutex-guarded,
/// per-instance token cache.
///
/// `get_token` holds the cache lock across the check and any refresh, so
/// callers arriving while a refresh is in flight wait for it and read the
/// refreshed cache instead of issuing their own fetch.
pub struct OAuth2ClientCredentialsProvider {
    http: Client,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    scope: Option<String>,
    cache: Mutex<TokenCache>,
}

impl std::fmt::Debug for OAuth2ClientCredentialsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2ClientCredentialsProvider")
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .finish()
    }
}

impl OAuth2ClientCredentialsProvider {
    /// Create a provider for one token endpoint. Endpoint, client id, and
    /// client secret must be non-blank.
    pub fn new(
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: Option<String>,
    ) -> Result<Self, ReportError> {
        let token_endpoint = token_endpoint.into();
        let client_id = client_id.into();
        let client_secret = client_secret.into();

        if token_endpoint.trim().is_empty() {
            return Err(ReportError::invalid_argument("token endpoint must not be empty"));
        }
        if client_id.trim().is_empty() {
            return Err(ReportError::invalid_argument("client id must not be empty"));
        }
        if client_secret.trim().is_empty() {
            return Err(ReportError::invalid_argument("client secret must not be empty"));
        }

        Ok(Self {
            http: build_http_client()?,
            token_endpoint,
            client_id,
            client_secret,
            scope,
            cache: Mutex::new(TokenCache {
                cached_token: None,
                expiry: DateTime::<Utc>::MIN_UTC,
            }),
        })
    }

    /// Replace the HTTP client, e.g. to share a pooled client across
    /// providers.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Perform the client-credentials round-trip and return the issued
    /// token with its lifetime in seconds. A non-success status or a
    /// payload without an access token is a fatal configuration error.
    async fn fetch_token(&self, cancel: &CancellationToken) -> Result<(String, i64), ReportError> {
        if cancel.is_cancelled() {
            return Err(ReportError::cancelled("token refresh"));
        }

        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        if let Some(scope) = self.scope.as_deref() {
            form.push(("scope", scope));
        }

        debug!(endpoint = %self.token_endpoint, "requesting access token");
        let send = self.http.post(&self.token_endpoint).form(&form).send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ReportError::cancelled("token refresh")),
            result = send => result.map_err(|error| ReportError::token(format!("token endpoint request failed: {error}")))?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::token(format!("token endpoint returned {status}")));
        }

        let payload: TokenResponse = response
            .json()
            .await
            .map_err(|error| ReportError::token(format!("malformed token endpoint response: {error}")))?;

        let access_token = payload
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ReportError::token("token endpoint response did not contain an access token"))?;

        let lifetime = payload.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        Ok((access_token, lifetime))
    }

    /// Fetch and store a fresh token while the cache lock is held.
    async fn refresh_locked(&self, cache: &mut TokenCache, cancel: &CancellationToken) -> Result<String, ReportError> {
        let (token, lifetime_secs) = self.fetch_token(cancel).await?;
        cache.cached_token = Some(token.clone());
        cache.expiry = Utc::now() + TimeDelta::seconds(lifetime_secs);
        debug!(lifetime_secs, "access token cached");
        Ok(token)
    }
}

#[async_trait]
impl TokenProvider for OAuth2ClientCredentialsProvider {
    async fn get_token(&self, cancel: &CancellationToken) -> Result<String, ReportError> {
        if cancel.is_cancelled() {
            return Err(ReportError::cancelled("token acquisition"));
        }

        let mut cache = self.cache.lock().await;

        if let Some(token) = cache.cached_token.as_ref()
            && !token.is_empty()
            && Utc::now() + TimeDelta::seconds(REFRESH_MARGIN_SECS) < cache.expiry
        {
            return Ok(token.clone());
        }

        self.refresh_locked(&mut cache, cancel).await
    }

    async fn is_token_valid(&self, token: &str) -> bool {
        if token.trim().is_empty() {
            return false;
        }

        // Signed tokens carry three non-empty dot-separated segments.
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 || segments.iter().any(|segment| segment.is_empty()) {
            return false;
        }

        let cache = self.cache.lock().await;
        match cache.cached_token.as_deref() {
            Some(cached) => cached == token && Utc::now() < cache.expiry,
            None => false,
        }
    }

    async fn refresh_token(&self, cancel: &CancellationToken) -> Result<(), ReportError> {
        let mut cache = self.cache.lock().await;
        if let Err(error) = self.refresh_locked(&mut cache, cancel).await {
            warn!(%error, "token refresh failed");
            return Err(error);
        }
        Ok(())
    }
}

/// Fluent OAuth2 attachment for REST reporters.
pub trait OAuth2ReporterExt: Sized {
    /// Build an [`OAuth2ClientCredentialsProvider`] from the given settings
    /// and attach it as the reporter's token provider.
    fn with_oauth2_client_credentials(
        self,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: Option<String>,
    ) -> Result<Self, ReportError>;
}

impl OAuth2ReporterExt for RestApiReporter {
    fn with_oauth2_client_credentials(
        self,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: Option<String>,
    ) -> Result<Self, ReportError> {
        let provider = OAuth2ClientCredentialsProvider::new(token_endpoint, client_id, client_secret, scope)?;
        Ok(self.with_token_provider(std::sync::Arc::new(provider)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OAuth2ClientCredentialsProvider {
        OAuth2ClientCredentialsProvider::new("https://auth.example.com/token", "client", "secret", None).unwrap()
    }

    #[test]
    fn oauth2_attachment_builds_and_installs_a_provider() {
        let reporter = RestApiReporter::new()
            .with_base_url("https://api.example.com")
            .with_oauth2_client_credentials("https://auth.example.com/token", "client", "secret", None)
            .unwrap();
        assert!(reporter.token_provider.is_some());

        let error = RestApiReporter::new()
            .with_oauth2_client_credentials("", "client", "secret", None)
            .unwrap_err();
        assert!(matches!(error, ReportError::InvalidArgument { .. }));
    }

    #[test]
    fn construction_rejects_blank_settings() {
        assert!(OAuth2ClientCredentialsProvider::new("", "client", "secret", None).is_err());
        assert!(OAuth2ClientCredentialsProvider::new("https://auth.example.com/token", "  ", "secret", None).is_err());
        assert!(OAuth2ClientCredentialsProvider::new("https://auth.example.com/token", "client", "", None).is_err());
    }

    #[tokio::test]
    async fn is_token_valid_rejects_structurally_bad_tokens() {
        let provider = provider();

        assert!(!provider.is_token_valid("").await);
        assert!(!provider.is_token_valid("   ").await);
        assert!(!provider.is_token_valid("only-one-part").await);
        assert!(!provider.is_token_valid("two.parts").await);
        assert!(!provider.is_token_valid("a.b.c.d").await);
        assert!(!provider.is_token_valid("a..c").await);
    }

    #[tokio::test]
    async fn is_token_valid_rejects_well_formed_but_uncached_tokens() {
        let provider = provider();
        assert!(!provider.is_token_valid("aaa.bbb.ccc").await);
    }

    #[tokio::test]
    async fn pre_cancelled_acquisition_fails_fast() {
        let provider = provider();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = provider.get_token(&cancel).await.unwrap_err();
        assert!(error.is_cancelled());
    }
}
