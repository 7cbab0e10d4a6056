//! Token sources

use std::{error, sync::Arc};

use aliri_clock::UnixTime;
use async_trait::async_trait;

use crate::{AccessToken, IdentityRequest, ScopeRef};

#[cfg(feature = "oauth2")]
pub mod azure;

#[cfg(feature = "oauth2")]
pub use azure::ClientSecretTokenSource;

/// An access token as issued by the identity provider
#[derive(Clone, Debug)]
pub struct IssuedToken {
    /// The bearer access token
    pub access_token: AccessToken,
    /// The time at which the token expires
    pub expires_at: UnixTime,
}

/// A capability to obtain a new access token from an identity provider
///
/// Implementations are expected to bound their own network calls with a timeout.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// The error type returned in the event that fetching a token fails
    type Error: error::Error + Send + Sync + 'static;

    /// Requests a new token for `identity` scoped to `scope`
    async fn fetch_token(
        &self,
        identity: &IdentityRequest,
        scope: &ScopeRef,
    ) -> Result<IssuedToken, Self::Error>;
}

#[async_trait]
impl<F: TokenFetcher + ?Sized> TokenFetcher for Arc<F> {
    type Error = F::Error;

    async fn fetch_token(
        &self,
        identity: &IdentityRequest,
        scope: &ScopeRef,
    ) -> Result<IssuedToken, Self::Error> {
        (**self).fetch_token(identity, scope).await
    }
}
