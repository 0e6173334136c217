// # Token Source Trait
//
// Defines how a credential mode obtains bearer tokens for the management
// API. Implementations live in `dns01-provider-azure`; caching and refresh
// are handled once, in [`crate::credential::TokenCache`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

/// A bearer token with its expiry
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// The bearer token; never logged
    pub token: String,
    /// Instant after which the token is rejected
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Create a token
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Whether the token is still valid `margin` from now
    pub fn is_valid_for(&self, margin: chrono::Duration) -> bool {
        Utc::now() + margin < self.expires_at
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<REDACTED>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Trait for credential implementations
///
/// Each call performs one token acquisition round trip. Implementations must
/// not cache: the shared [`crate::credential::TokenCache`] decides when a
/// fresh token is needed.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Acquire a token for `scope` (e.g. `https://management.azure.com/.default`)
    async fn fetch_token(&self, scope: &str) -> Result<AccessToken, crate::Error>;

    /// Credential name for logging
    fn source_name(&self) -> &'static str;
}
