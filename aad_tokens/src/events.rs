//! Lifecycle events emitted by the token cache

use std::fmt;

/// A notable step in the life of a cached credential
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// The cached credential is missing or too close to expiry and will be refreshed
    NoValidToken,
    /// A newly fetched credential replaced the cached one
    TokenSet,
    /// The cached credential is fresh and was served as-is
    ValidTokenPresent,
}

impl LifecycleEvent {
    /// The stable name of the event
    pub const fn name(self) -> &'static str {
        match self {
            Self::NoValidToken => "no_valid_token",
            Self::TokenSet => "token_set",
            Self::ValidTokenPresent => "valid_token_present",
        }
    }

    /// The informational message associated with the event
    pub const fn message(self) -> &'static str {
        match self {
            Self::NoValidToken => "No valid token, token will be requested.",
            Self::TokenSet => "Token was set.",
            Self::ValidTokenPresent => "A valid token is present, no need to request it.",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A sink for lifecycle events
pub trait EventSink: Send + Sync {
    /// Records that an event occurred
    fn record(&self, event: LifecycleEvent);
}

/// An event sink that emits each event as an informational `tracing` event
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    #[inline]
    fn record(&self, event: LifecycleEvent) {
        tracing::info!(event = event.name(), "{}", event.message());
    }
}
