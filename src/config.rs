//! Server and proxy configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default subscriber cap per registration path.
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 100;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Game server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Cap on the rooms-list subscriber set and on each room's subscriber set
    pub max_subscribers: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_subscribers: DEFAULT_MAX_SUBSCRIBERS,
        }
    }
}

impl ServerConfig {
    pub fn new(max_subscribers: usize) -> Self {
        Self { max_subscribers }
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_subscribers == 0 {
            return Err(ConfigError::Invalid("maxSubscribers must be at least 1"));
        }
        Ok(())
    }
}

/// Client-side proxy configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfig {
    /// Passed along with every outgoing payload
    pub auth_token: String,
}

impl ProxyConfig {
    pub fn new(auth_token: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::from_json("{}").unwrap();
        assert_eq!(config.max_subscribers, DEFAULT_MAX_SUBSCRIBERS);
    }

    #[test]
    fn test_server_from_json() {
        let config = ServerConfig::from_json(r#"{"maxSubscribers": 10}"#).unwrap();
        assert_eq!(config, ServerConfig::new(10));
    }

    #[test]
    fn test_server_rejects_zero_cap() {
        let result = ServerConfig::from_json(r#"{"maxSubscribers": 0}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = ServerConfig::from_json("not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_proxy_from_json() {
        let config = ProxyConfig::from_json(r#"{"authToken": "t0k3n"}"#).unwrap();
        assert_eq!(config.auth_token, "t0k3n");
    }
}
