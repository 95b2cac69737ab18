//! Server configuration.

use std::net::SocketAddr;

/// Configuration for the API surface, loaded from the environment.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address the HTTP server binds to (`WEBPILOT_BIND`).
    pub bind_addr: SocketAddr,
    /// Event-bus channel capacity (`WEBPILOT_EVENT_CAPACITY`).
    pub event_capacity: usize,
    /// Request body limit in bytes (`WEBPILOT_BODY_LIMIT`).
    pub body_limit: usize,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held an unparsable value.
    #[error("invalid {name}: {value:?} ({reason})")]
    Invalid {
        /// The variable name.
        name: &'static str,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8710)),
            event_capacity: 256,
            body_limit: 2 * 1024 * 1024,
        }
    }
}

impl ApiConfig {
    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(value) = std::env::var("WEBPILOT_BIND") {
            config.bind_addr = value.parse().map_err(|e| ConfigError::Invalid {
                name: "WEBPILOT_BIND",
                value,
                reason: format!("{e}"),
            })?;
        }
        if let Ok(value) = std::env::var("WEBPILOT_EVENT_CAPACITY") {
            config.event_capacity = parse_nonzero("WEBPILOT_EVENT_CAPACITY", &value)?;
        }
        if let Ok(value) = std::env::var("WEBPILOT_BODY_LIMIT") {
            config.body_limit = parse_nonzero("WEBPILOT_BODY_LIMIT", &value)?;
        }
        Ok(config)
    }

    /// A config suitable for tests: ephemeral port, small buffers.
    #[cfg(any(test, feature = "test-util"))]
    #[must_use]
    pub fn for_test() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            event_capacity: 64,
            body_limit: 256 * 1024,
        }
    }
}

fn parse_nonzero(name: &'static str, value: &str) -> Result<usize, ConfigError> {
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        Ok(_) => Err(ConfigError::Invalid {
            name,
            value: value.to_owned(),
            reason: "must be positive".into(),
        }),
        Err(e) => Err(ConfigError::Invalid {
            name,
            value: value.to_owned(),
            reason: format!("{e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_addr.port(), 8710);
        assert!(config.event_capacity > 0);
    }

    #[test]
    fn rejects_zero_capacity() {
        assert!(parse_nonzero("WEBPILOT_EVENT_CAPACITY", "0").is_err());
        assert!(parse_nonzero("WEBPILOT_EVENT_CAPACITY", "abc").is_err());
        assert_eq!(parse_nonzero("WEBPILOT_EVENT_CAPACITY", "32").unwrap(), 32);
    }
}
