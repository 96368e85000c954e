//! Configuration for creditagent.
//!
//! Everything is resolved from env vars. `.env` files are loaded early in
//! startup (see [`crate::bootstrap`]), so explicit env vars always win.

mod agent;
mod database;
mod discord;
pub(crate) mod helpers;
mod http;

use crate::error::ConfigError;

pub use self::agent::AgentConfig;
pub use self::database::{DatabaseBackend, DatabaseConfig, default_libsql_path};
pub use self::discord::{DEFAULT_DISCORD_API_BASE_URL, DiscordConfig, FollowUpRetryConfig};
pub use self::http::HttpConfig;

/// Main configuration for the service.
#[derive(Debug, Clone)]
pub struct Config {
    pub discord: DiscordConfig,
    pub agent: AgentConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
}

impl Config {
    /// Resolve the full configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let discord = DiscordConfig::resolve()?;
        let agent = AgentConfig::resolve(&discord.application_id)?;
        Ok(Self {
            agent,
            database: DatabaseConfig::resolve()?,
            http: HttpConfig::resolve()?,
            discord,
        })
    }
}
