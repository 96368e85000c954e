use secrecy::SecretString;

use crate::config::helpers::{optional_env, parse_env_or};
use crate::error::ConfigError;

/// Inbound HTTP listener.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token required by `/register` when set.
    pub register_token: Option<SecretString>,
}

impl HttpConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            host: optional_env("HTTP_HOST")?.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_env_or("HTTP_PORT", 8080u16, "a valid port number")?,
            register_token: optional_env("REGISTER_TOKEN")?.map(SecretString::from),
        })
    }
}
