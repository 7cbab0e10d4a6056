use aad_tokens::{
    ClientId, ClientSecret, IdentityField, IdentityRequest, RefreshPolicy, TenantId,
    DEFAULT_SAFETY_MARGIN,
};
use aliri_clock::DurationSecs;
use serde::Deserialize;
use serde_json::Value;

use crate::{ConfigurationError, ConnectionParams};

/// Refresh tokens with fewer than this many minutes of validity remaining
pub const DEFAULT_REFRESH_BEFORE_MINUTES: u64 = 5;

/// The Azure AD options block of a set of connection parameters
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AadOptions {
    /// The service principal's client ID
    #[serde(rename = "SP_CLIENT_ID", default)]
    pub client_id: Option<ClientId>,

    /// The service principal's client secret
    #[serde(rename = "SP_CLIENT_SECRET", default)]
    pub client_secret: Option<ClientSecret>,

    /// The tenant the service principal belongs to
    #[serde(rename = "SP_TENANT_ID", default)]
    pub tenant_id: Option<TenantId>,

    /// The remaining validity, in minutes, below which a token is refreshed
    ///
    /// Fractional minutes are accepted and rounded to the nearest second.
    #[serde(rename = "REFRESH_BEFORE_MINUTES", default)]
    pub refresh_before_minutes: Option<f64>,
}

impl AadOptions {
    /// Reads the options block from connection parameters
    ///
    /// Returns `None` when the block is absent, null, or empty, indicating that
    /// Azure AD authentication was not requested.
    pub fn from_params(params: &ConnectionParams) -> Result<Option<Self>, ConfigurationError> {
        match params.aad_options() {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(block)) if block.is_empty() => Ok(None),
            Some(block) => AadOptions::deserialize(block)
                .map(Some)
                .map_err(ConfigurationError::InvalidOptions),
        }
    }

    /// Builds the identity request described by these options
    ///
    /// Missing and empty values are both reported as missing.
    pub fn identity(&self) -> Result<IdentityRequest, ConfigurationError> {
        IdentityRequest::new(
            self.tenant_id
                .clone()
                .unwrap_or_else(|| TenantId::from_static("")),
            self.client_id
                .clone()
                .unwrap_or_else(|| ClientId::from_static("")),
            self.client_secret
                .clone()
                .unwrap_or_else(|| ClientSecret::from_static("")),
        )
        .map_err(|err| {
            ConfigurationError::MissingOptions(
                err.missing().iter().copied().map(setting_name).collect(),
            )
        })
    }

    /// Builds the refresh policy described by these options
    ///
    /// The refresh margin must be a finite, non-negative number of minutes.
    /// Margins beyond the representable range are clamped, so every cached
    /// token is treated as due for refresh.
    pub fn refresh_policy(&self) -> Result<RefreshPolicy, ConfigurationError> {
        let safety_margin = match self.refresh_before_minutes {
            None => DEFAULT_SAFETY_MARGIN,
            Some(minutes) if minutes.is_finite() && minutes >= 0.0 => {
                DurationSecs((minutes * 60.0).round() as u64)
            }
            Some(minutes) => return Err(ConfigurationError::InvalidRefreshMargin(minutes)),
        };

        Ok(RefreshPolicy::default().with_safety_margin(safety_margin))
    }
}

fn setting_name(field: IdentityField) -> &'static str {
    match field {
        IdentityField::TenantId => "SP_TENANT_ID",
        IdentityField::ClientId => "SP_CLIENT_ID",
        IdentityField::ClientSecret => "SP_CLIENT_SECRET",
    }
}
