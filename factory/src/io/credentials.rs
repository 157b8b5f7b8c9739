//! API key resolution from the environment.

use std::fmt;

use tracing::warn;

/// Value used when the key variable is unset. Every call made with it fails.
pub const PLACEHOLDER_KEY: &str = "key";

/// Where the API key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    Placeholder,
}

/// API key for the model endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    value: String,
    source: KeySource,
}

impl ApiKey {
    /// Read `var` from the process environment, falling back to the placeholder.
    pub fn from_env(var: &str) -> Self {
        Self::from_value(std::env::var(var).ok())
    }

    /// Build a key from an optional raw value. Blank values count as missing.
    pub fn from_value(value: Option<String>) -> Self {
        match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
            Some(value) if value != PLACEHOLDER_KEY => Self {
                value,
                source: KeySource::Environment,
            },
            _ => Self {
                value: PLACEHOLDER_KEY.to_string(),
                source: KeySource::Placeholder,
            },
        }
    }

    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> KeySource {
        self.source
    }

    pub fn is_configured(&self) -> bool {
        self.source == KeySource::Environment
    }

    /// Log a startup warning when the key is missing. Never fatal.
    pub fn warn_if_missing(&self, var: &str) {
        if !self.is_configured() {
            warn!(
                env = var,
                "API key missing or invalid; every persona call will fail until it is set"
            );
        }
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}
