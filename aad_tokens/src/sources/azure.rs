//! A token source that uses the Azure AD v2.0 token endpoint as an authority

use aliri_clock::{Clock, System};
use async_trait::async_trait;
use thiserror::Error;

use super::{IssuedToken, TokenFetcher};
use crate::{IdentityRequest, ScopeRef};

pub mod dto;

/// The public Azure AD authority
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// A token source for the client credentials flow using a client secret
#[derive(Debug)]
pub struct ClientSecretTokenSource<C = System> {
    client: reqwest::Client,
    authority: String,
    clock: C,
}

impl ClientSecretTokenSource {
    /// Constructs a new client secret token source against the public Azure AD authority
    ///
    /// Timeouts for the token request are taken from `client`.
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            authority: DEFAULT_AUTHORITY.to_owned(),
            clock: System,
        }
    }
}

impl<C> ClientSecretTokenSource<C> {
    /// Uses a different authority host, such as a sovereign cloud
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    /// Sets a custom clock to be used
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> ClientSecretTokenSource<D> {
        ClientSecretTokenSource {
            client: self.client,
            authority: self.authority,
            clock,
        }
    }

    fn token_url(&self, identity: &IdentityRequest) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority.trim_end_matches('/'),
            identity.tenant_id()
        )
    }
}

#[async_trait]
impl<C: Clock + Send + Sync> TokenFetcher for ClientSecretTokenSource<C> {
    type Error = TokenRequestError;

    async fn fetch_token(
        &self,
        identity: &IdentityRequest,
        scope: &ScopeRef,
    ) -> Result<IssuedToken, Self::Error> {
        let token_url = self.token_url(identity);
        request_token(&self.client, &token_url, identity, scope, &self.clock).await
    }
}

/// An error while attempting to request a new token from the authority
#[derive(Debug, Error)]
pub enum TokenRequestError {
    /// An error from the authority with an error body
    #[error("error requesting token from authority: {body}")]
    ErrorWithBody {
        /// The underlying request error
        source: reqwest::Error,
        /// The body of the error
        body: String,
    },
    /// Unable to deserialize the token body
    #[error("error deserializing token body from authority")]
    TokenBodyError(#[from] serde_json::Error),
    /// Unable to read the response
    #[error("error reading response body")]
    BodyReadError(#[source] reqwest::Error),
    /// Unable to send a token request to the authority
    #[error("error sending request to authority")]
    RequestSend(#[source] reqwest::Error),
}

#[tracing::instrument(
    err,
    skip(client, identity, scope, clock),
    fields(
        credentials.tenant_id = %identity.tenant_id(),
        credentials.client_id = %identity.client_id(),
        scope = %scope,
    ),
)]
async fn request_token<C: Clock>(
    client: &reqwest::Client,
    token_url: &str,
    identity: &IdentityRequest,
    scope: &ScopeRef,
    clock: &C,
) -> Result<IssuedToken, TokenRequestError> {
    tracing::trace!("requesting token from authority");

    let form = dto::ClientCredentialsForm::new(identity, scope);
    let resp = client
        .post(token_url)
        .form(&form)
        .send()
        .await
        .map_err(TokenRequestError::RequestSend)?;

    tracing::debug!(
        response.status = resp.status().as_u16(),
        "received token response from issuing authority"
    );

    if let Err(error) = resp.error_for_status_ref() {
        let body = resp
            .text()
            .await
            .map_err(TokenRequestError::BodyReadError)?;
        return Err(TokenRequestError::ErrorWithBody {
            source: error,
            body,
        });
    }

    let body = resp
        .bytes()
        .await
        .map_err(TokenRequestError::BodyReadError)?;
    let resp: dto::TokenResponse = serde_json::from_slice(&body)?;

    let token = resp.into_issued_token(clock.now());

    tracing::info!(expiry = token.expires_at.0, "received new access token");

    Ok(token)
}
