//! DTOs for interacting with the Azure AD token endpoint

use aliri_clock::UnixTime;
use serde::{Deserialize, Serialize};

use crate::sources::IssuedToken;
use crate::{AccessToken, ClientIdRef, ClientSecretRef, IdentityRequest, ScopeRef};

/// The form body of a client credentials grant
#[derive(Debug, Serialize)]
pub struct ClientCredentialsForm<'a> {
    grant_type: &'static str,
    client_id: &'a ClientIdRef,
    client_secret: &'a ClientSecretRef,
    scope: &'a ScopeRef,
}

impl<'a> ClientCredentialsForm<'a> {
    /// Constructs the form for an identity and scope
    pub fn new(identity: &'a IdentityRequest, scope: &'a ScopeRef) -> Self {
        Self {
            grant_type: "client_credentials",
            client_id: identity.client_id(),
            client_secret: identity.client_secret(),
            scope,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct TokenResponse {
    pub access_token: AccessToken,
    pub expires_in: u64,
}

impl TokenResponse {
    pub(super) fn into_issued_token(self, now: UnixTime) -> IssuedToken {
        IssuedToken {
            access_token: self.access_token,
            expires_at: UnixTime(now.0.saturating_add(self.expires_in)),
        }
    }
}
