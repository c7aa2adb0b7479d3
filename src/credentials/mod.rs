//! Credential lifecycle management for cloud-identity providers.
//!
//! Static-key providers need no lifecycle: the key comes from config and is
//! attached as-is. Cloud-identity providers authenticate with short-lived
//! bearer tokens, acquired from an identity endpoint and cached per scope by
//! [`TokenCache`] with single-flight refresh coordination.

mod azure;
mod cache;

pub use azure::{AzureClientCredentials, DEFAULT_SCOPE};
pub use cache::{TokenCache, TokenSource, ACQUIRE_TIMEOUT, SAFETY_MARGIN, TOKEN_LIFETIME};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Token source installed when no cloud-identity provider is configured.
///
/// Routing never reaches the cache in that configuration; this exists so the
/// cache always has a source and a misrouted call fails loudly instead of
/// panicking.
pub struct NoIdentityConfigured;

#[async_trait]
impl TokenSource for NoIdentityConfigured {
    async fn acquire(&self, scope: &str) -> Result<String> {
        Err(Error::CredentialAcquisition(format!(
            "no cloud identity credentials configured (scope '{}')",
            scope
        )))
    }
}
