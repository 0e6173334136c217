//! Shared token cache
//!
//! Wraps a [`TokenSource`] with a cached token and its expiry. Every API call
//! asks the cache for a token; a fresh one is fetched only when the cached one
//! is missing or has less than [`REFRESH_MARGIN_SECS`] left.
//!
//! The cache lock is held across the fetch so concurrent callers wait for a
//! single in-flight refresh instead of all hitting the token endpoint.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::traits::{AccessToken, TokenSource};

/// Refresh tokens with less than this many seconds of validity left
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// Token cache shared by all concurrent API calls
pub struct TokenCache {
    source: Arc<dyn TokenSource>,
    scope: String,
    margin: chrono::Duration,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    /// Create a cache for `scope` with the default refresh margin
    pub fn new(source: Arc<dyn TokenSource>, scope: impl Into<String>) -> Self {
        Self::with_margin(source, scope, chrono::Duration::seconds(REFRESH_MARGIN_SECS))
    }

    /// Create a cache with a custom refresh margin
    pub fn with_margin(
        source: Arc<dyn TokenSource>,
        scope: impl Into<String>,
        margin: chrono::Duration,
    ) -> Self {
        Self {
            source,
            scope: scope.into(),
            margin,
            cached: Mutex::new(None),
        }
    }

    /// Return a valid bearer token, refreshing it if needed
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_valid_for(self.margin) {
                return Ok(token.token.clone());
            }
            debug!(source = self.source.source_name(), "Cached token near expiry, refreshing");
        }

        let fresh = self.source.fetch_token(&self.scope).await?;
        debug!(
            source = self.source.source_name(),
            expires_at = %fresh.expires_at,
            "Acquired access token"
        );
        let value = fresh.token.clone();
        *cached = Some(fresh);
        Ok(value)
    }

    /// Drop the cached token so the next call fetches a new one
    ///
    /// Used after the API rejected a token with 401.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    /// Name of the underlying credential
    pub fn source_name(&self) -> &'static str {
        self.source.source_name()
    }

    /// Scope tokens are requested for
    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("source", &self.source.source_name())
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
