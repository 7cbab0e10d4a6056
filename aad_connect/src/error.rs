use aad_tokens::CredentialFetchError;
use thiserror::Error;

/// The connection settings cannot be used to authenticate with Azure AD
///
/// Every failure to obtain a credential is reported as a configuration
/// error. The underlying cause remains available through
/// [`source()`][std::error::Error::source()].
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Required options were missing or empty
    #[error(
        "connection settings are improperly configured, please supply all AAD_OPTIONS values (missing {})",
        .0.join(", ")
    )]
    MissingOptions(Vec<&'static str>),
    /// The options block could not be interpreted
    #[error("connection settings are improperly configured, AAD_OPTIONS is malformed")]
    InvalidOptions(#[source] serde_json::Error),
    /// The refresh margin was negative or not a number
    #[error("connection settings are improperly configured, REFRESH_BEFORE_MINUTES must be a non-negative number of minutes (got {0})")]
    InvalidRefreshMargin(f64),
    /// An access token could not be obtained
    #[error("connection settings AAD is improperly configured, could not retrieve an access token")]
    TokenUnavailable(#[from] CredentialFetchError),
}
