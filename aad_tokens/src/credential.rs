use std::fmt;

use aliri_clock::{Clock, DurationSecs, System, UnixTime};
use thiserror::Error;

use crate::{
    AccessToken, AccessTokenRef, ClientId, ClientIdRef, ClientSecret, ClientSecretRef, Scope,
    ScopeRef, TenantId, TenantIdRef,
};

/// The scope used to request tokens for Azure Database for PostgreSQL
pub const POSTGRES_AAD_SCOPE: &str = "https://ossrdbms-aad.database.windows.net/.default";

/// The default remaining validity below which a token will be refreshed
pub const DEFAULT_SAFETY_MARGIN: DurationSecs = DurationSecs(5 * 60);

/// A cached access token along with the instant at which it expires
///
/// The token value and its expiry are always replaced together. A credential
/// can only be constructed with a non-empty token and a known expiry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    access_token: AccessToken,
    expires_at: UnixTime,
}

/// The reason a token issued by the identity provider cannot be cached
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum UnusableToken {
    /// The access token was empty
    #[error("access token is empty")]
    EmptyAccessToken,
    /// The token carried no meaningful expiry
    #[error("access token has no expiry")]
    MissingExpiry,
}

impl Credential {
    /// Constructs a credential from an access token and its expiry
    pub fn new(access_token: AccessToken, expires_at: UnixTime) -> Result<Self, UnusableToken> {
        if access_token.as_str().is_empty() {
            return Err(UnusableToken::EmptyAccessToken);
        }

        if expires_at == UnixTime(0) {
            return Err(UnusableToken::MissingExpiry);
        }

        Ok(Self {
            access_token,
            expires_at,
        })
    }

    /// Gets the current access token
    #[inline]
    pub fn access_token(&self) -> &AccessTokenRef {
        &self.access_token
    }

    /// Gets the time that the token will expire
    #[inline]
    pub fn expires_at(&self) -> UnixTime {
        self.expires_at
    }

    /// Whether the token remains valid for at least `safety_margin` past `time`
    ///
    /// A token expiring exactly at the end of the margin is still fresh. A margin
    /// longer than any representable lifetime leaves no token fresh.
    #[inline]
    pub fn is_fresh_at(&self, time: UnixTime, safety_margin: DurationSecs) -> bool {
        self.expires_at.0.saturating_sub(time.0) >= safety_margin.0
    }

    /// Whether the token is fresh based on the current time as reported by the provided clock
    #[inline]
    pub fn is_fresh_with_clock<C: Clock>(&self, clock: &C, safety_margin: DurationSecs) -> bool {
        self.is_fresh_at(clock.now(), safety_margin)
    }

    /// Gets a duration for how much longer the token would be valid as of the
    /// provided time
    #[inline]
    pub fn until_expired_at(&self, time: UnixTime) -> DurationSecs {
        if time < self.expires_at {
            self.expires_at - time
        } else {
            DurationSecs(0)
        }
    }

    /// Gets a duration for how much longer the token will be valid
    #[inline]
    pub fn until_expired(&self) -> DurationSecs {
        self.until_expired_at(System.now())
    }
}

/// Configuration for deciding when a cached credential must be refreshed
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshPolicy {
    safety_margin: DurationSecs,
    scope: Scope,
}

impl Default for RefreshPolicy {
    /// Default refresh policy
    ///
    /// Refreshes tokens with less than five minutes of validity remaining and
    /// requests them for the Azure Database for PostgreSQL scope.
    fn default() -> Self {
        Self {
            safety_margin: DEFAULT_SAFETY_MARGIN,
            scope: Scope::from_static(POSTGRES_AAD_SCOPE),
        }
    }
}

impl RefreshPolicy {
    /// Sets the minimum remaining validity for a credential to be served from the cache
    pub fn with_safety_margin(mut self, safety_margin: DurationSecs) -> Self {
        self.safety_margin = safety_margin;
        self
    }

    /// Sets the scope to request tokens for
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Gets the safety margin
    #[inline]
    pub fn safety_margin(&self) -> DurationSecs {
        self.safety_margin
    }

    /// Gets the requested scope
    #[inline]
    pub fn scope(&self) -> &ScopeRef {
        &self.scope
    }
}

/// A field of an identity request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityField {
    /// The tenant ID
    TenantId,
    /// The client ID
    ClientId,
    /// The client secret
    ClientSecret,
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TenantId => "tenant ID",
            Self::ClientId => "client ID",
            Self::ClientSecret => "client secret",
        })
    }
}

/// An identity request could not be constructed
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("identity request is missing required fields: {}", display_fields(.missing))]
pub struct IdentityError {
    missing: Vec<IdentityField>,
}

impl IdentityError {
    /// The fields that were missing or empty
    pub fn missing(&self) -> &[IdentityField] {
        &self.missing
    }
}

fn display_fields(fields: &[IdentityField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The service principal identity used to request a token
#[derive(Clone, Debug)]
pub struct IdentityRequest {
    tenant_id: TenantId,
    client_id: ClientId,
    client_secret: ClientSecret,
}

impl IdentityRequest {
    /// Constructs a new identity request
    ///
    /// Every field must be non-empty.
    pub fn new(
        tenant_id: TenantId,
        client_id: ClientId,
        client_secret: ClientSecret,
    ) -> Result<Self, IdentityError> {
        let missing: Vec<_> = [
            (IdentityField::TenantId, tenant_id.as_str().is_empty()),
            (IdentityField::ClientId, client_id.as_str().is_empty()),
            (IdentityField::ClientSecret, client_secret.as_str().is_empty()),
        ]
        .into_iter()
        .filter_map(|(field, empty)| empty.then_some(field))
        .collect();

        if !missing.is_empty() {
            return Err(IdentityError { missing });
        }

        Ok(Self {
            tenant_id,
            client_id,
            client_secret,
        })
    }

    /// Gets the tenant ID
    #[inline]
    pub fn tenant_id(&self) -> &TenantIdRef {
        &self.tenant_id
    }

    /// Gets the client ID
    #[inline]
    pub fn client_id(&self) -> &ClientIdRef {
        &self.client_id
    }

    /// Gets the client secret
    #[inline]
    pub fn client_secret(&self) -> &ClientSecretRef {
        &self.client_secret
    }
}
