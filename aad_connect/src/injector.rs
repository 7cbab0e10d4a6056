use std::{fmt, sync::Arc};

use aad_tokens::{sources::TokenFetcher, TokenCache};
use aliri_clock::{Clock, System, UnixTime};

use crate::{AadOptions, ConfigurationError, ConnectionParams};

/// Injects the cached access token into connection parameters
///
/// The injector holds a shared [`TokenCache`]. Clones share the same cache,
/// so every connection built from them reuses the same credential.
pub struct CredentialInjector<F, C = System> {
    cache: Arc<TokenCache<F, C>>,
}

impl<F, C> CredentialInjector<F, C> {
    /// Constructs an injector backed by `cache`
    pub fn new(cache: Arc<TokenCache<F, C>>) -> Self {
        Self { cache }
    }

    /// Gets the underlying token cache
    pub fn cache(&self) -> &Arc<TokenCache<F, C>> {
        &self.cache
    }
}

impl<F: TokenFetcher, C: Clock> CredentialInjector<F, C> {
    /// Sets the password of `params` to a fresh access token
    ///
    /// See [`inject_at()`][Self::inject_at()].
    pub async fn inject(
        &self,
        params: ConnectionParams,
    ) -> Result<ConnectionParams, ConfigurationError> {
        let now = self.cache.now();
        self.inject_at(params, now).await
    }
}

impl<F: TokenFetcher, C> CredentialInjector<F, C> {
    /// Sets the password of `params` to an access token that is fresh as of `now`
    ///
    /// When `params` does not request Azure AD authentication, they are returned
    /// unchanged. Otherwise the options block is validated, the cached credential
    /// is refreshed if required, and the password is replaced with its token.
    /// No other parameter is modified.
    pub async fn inject_at(
        &self,
        mut params: ConnectionParams,
        now: UnixTime,
    ) -> Result<ConnectionParams, ConfigurationError> {
        let Some(options) = AadOptions::from_params(&params)? else {
            tracing::trace!("no AAD options present, leaving connection parameters unchanged");
            return Ok(params);
        };

        let identity = options.identity()?;
        let policy = options.refresh_policy()?;

        let credential = self.cache.ensure_fresh_at(&identity, &policy, now).await?;

        params.set_password(credential.access_token());
        tracing::debug!(
            token.expiry = credential.expires_at().0,
            token.until_expired = credential.until_expired_at(now).0,
            "injected access token into connection parameters"
        );

        Ok(params)
    }
}

impl<F, C> Clone for CredentialInjector<F, C> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
        }
    }
}

impl<F, C> fmt::Debug for CredentialInjector<F, C>
where
    F: fmt::Debug,
    C: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CredentialInjector")
            .field("cache", &self.cache)
            .finish()
    }
}
