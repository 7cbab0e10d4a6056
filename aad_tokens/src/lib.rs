//! A process-wide cache for short-lived Azure AD access tokens
//!
//! Services that authenticate to a downstream resource (such as Azure Database
//! for PostgreSQL) with a service principal need a bearer token on every new
//! connection. Requesting a token per connection is wasteful, and holding onto
//! a token until it hard-expires causes connection failures. This crate keeps
//! a single credential in memory and refreshes it only once its remaining
//! validity drops below a safety margin.
//!
//! The credential is replaced as a single immutable record, so concurrent readers
//! never observe a token paired with another token's expiry. Refreshes are
//! serialized, and a failed refresh never disturbs the previously cached state.
//!
//! ```
//! use std::sync::Arc;
//!
//! use aad_tokens::{
//!     sources::ClientSecretTokenSource, ClientId, ClientSecret, IdentityRequest,
//!     RefreshPolicy, TenantId, TokenCache,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = IdentityRequest::new(
//!     TenantId::from_static("contoso.onmicrosoft.com"),
//!     ClientId::from_static("00000000-0000-0000-0000-000000000000"),
//!     ClientSecret::from_static("secret"),
//! )?;
//!
//! let cache = Arc::new(TokenCache::new(ClientSecretTokenSource::new(
//!     reqwest::Client::new(),
//! )));
//!
//! # /* Commented out due to this trying to interact with the world.
//! let credential = cache.ensure_fresh(&identity, &RefreshPolicy::default()).await?;
//! tracing::info!(expiry = credential.expires_at().0, "obtained access token");
//! # */
//! # let _ = (cache, identity);
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! * `oauth2` (default): Provides [`ClientSecretTokenSource`][sources::ClientSecretTokenSource],
//!   which performs the client credentials flow against the Azure AD v2.0 token endpoint.
//! * `rustls-tls` (default) and `default-tls`: Select the TLS backend used by `reqwest`.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod braids;
mod cache;
mod credential;
pub mod events;
pub mod sources;

pub use braids::*;
pub use cache::{CredentialFetchError, TokenCache};
pub use credential::{
    Credential, IdentityError, IdentityField, IdentityRequest, RefreshPolicy, UnusableToken,
    DEFAULT_SAFETY_MARGIN, POSTGRES_AAD_SCOPE,
};
