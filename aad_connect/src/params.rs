use std::fmt;

use aad_tokens::AccessTokenRef;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The key of the password or credential slot
pub const PASSWORD: &str = "PASSWORD";

/// The key of the nested Azure AD options block
pub const AAD_OPTIONS: &str = "AAD_OPTIONS";

/// A set of connection parameters, keyed by name
///
/// Only the [`AAD_OPTIONS`] block and the [`PASSWORD`] slot carry meaning here.
/// All other entries are passed through untouched.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionParams(Map<String, Value>);

impl ConnectionParams {
    /// Constructs an empty parameter set
    pub fn new() -> Self {
        Self::default()
    }

    /// Gets the value of a parameter
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Sets the value of a parameter, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Gets the current password, if it is set to a string
    pub fn password(&self) -> Option<&str> {
        self.0.get(PASSWORD).and_then(Value::as_str)
    }

    /// Overwrites the password slot with an access token
    pub fn set_password(&mut self, access_token: &AccessTokenRef) {
        self.0
            .insert(PASSWORD.to_owned(), Value::from(access_token.as_str()));
    }

    /// Gets the raw Azure AD options block
    pub fn aad_options(&self) -> Option<&Value> {
        self.0.get(AAD_OPTIONS)
    }

    /// Consumes the parameters, returning the underlying map
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.0 {
            match key.as_str() {
                PASSWORD => map.entry(key, &format_args!("***PASSWORD***")),
                AAD_OPTIONS => map.entry(key, &format_args!("***AAD OPTIONS***")),
                _ => map.entry(key, value),
            };
        }
        map.finish()
    }
}
