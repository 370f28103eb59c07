//! Bearer-credential provider contract.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ReportError;

/// Issues and caches bearer credentials for authenticated resolvers.
///
/// Implementations own their cache and serialize refreshes internally; a
/// provider instance may be shared across reporters via `Arc`.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a valid token, refreshing over the network when the cached
    /// one is missing or close to expiry.
    async fn get_token(&self, cancel: &CancellationToken) -> Result<String, ReportError>;

    /// Purely local validity check: structure, cache identity, and expiry.
    /// Never performs a network call.
    async fn is_token_valid(&self, token: &str) -> bool;

    /// Unconditionally fetch a fresh token, bypassing the cache check.
    async fn refresh_token(&self, cancel: &CancellationToken) -> Result<(), ReportError>;
}
