use std::time::Duration;

use secrecy::SecretString;

use crate::config::helpers::{optional_env, parse_env_or, required_env, validate_http_url};
use crate::error::ConfigError;

/// External agent runtime settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub runtime_url: String,
    pub api_key: Option<SecretString>,
    /// Account id the agent posts as. Defaults to the Discord application id.
    pub agent_id: String,
    pub timeout: Duration,
}

impl AgentConfig {
    pub(crate) fn resolve(application_id: &str) -> Result<Self, ConfigError> {
        let runtime_url = required_env(
            "AGENT_RUNTIME_URL",
            "Point this at the agent runtime that answers /help.",
        )?;
        Ok(Self {
            runtime_url: validate_http_url("AGENT_RUNTIME_URL", &runtime_url)?,
            api_key: optional_env("AGENT_RUNTIME_API_KEY")?.map(SecretString::from),
            agent_id: optional_env("AGENT_ID")?.unwrap_or_else(|| application_id.to_string()),
            timeout: Duration::from_secs(parse_env_or(
                "AGENT_RUNTIME_TIMEOUT_SECS",
                120u64,
                "a number of seconds",
            )?),
        })
    }
}
