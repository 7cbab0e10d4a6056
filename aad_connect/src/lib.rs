//! Azure AD authentication for database connection parameters
//!
//! Connection parameters that carry an `AAD_OPTIONS` block are authenticated with
//! a short-lived Azure AD access token in place of a static password. The token
//! is drawn from a shared [`TokenCache`][aad_tokens::TokenCache] each time
//! parameters are built, so it is only requested from the identity provider when
//! the cached token is missing or close to expiry.
//!
//! ```
//! use std::sync::Arc;
//!
//! use aad_connect::{ConnectionParams, CredentialInjector};
//! use aad_tokens::{sources::ClientSecretTokenSource, TokenCache};
//!
//! # #[tokio::main(flavor = "current_thread")] async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = TokenCache::new(ClientSecretTokenSource::new(reqwest::Client::new()));
//! let injector = CredentialInjector::new(Arc::new(cache));
//!
//! let params: ConnectionParams = serde_json::from_str(r#"{
//!     "HOST": "example.postgres.database.azure.com",
//!     "USER": "app@example",
//!     "PASSWORD": ""
//! }"#)?;
//!
//! // No AAD_OPTIONS block, so the parameters pass through untouched
//! let params = injector.inject(params).await?;
//! assert_eq!(params.password(), Some(""));
//! # Ok(())
//! # }
//! ```
//!
//! The parameter block recognizes the following options:
//!
//! * `SP_CLIENT_ID`: The client ID of the service principal (required)
//! * `SP_CLIENT_SECRET`: The client secret of the service principal (required)
//! * `SP_TENANT_ID`: The tenant of the service principal (required)
//! * `REFRESH_BEFORE_MINUTES`: Refresh tokens with less validity than this remaining
//!   (default: 5)

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

mod error;
mod injector;
mod options;
mod params;

pub use error::ConfigurationError;
pub use injector::CredentialInjector;
pub use options::{AadOptions, DEFAULT_REFRESH_BEFORE_MINUTES};
pub use params::{ConnectionParams, AAD_OPTIONS, PASSWORD};
