use std::collections::BTreeSet;
use std::time::Duration;

use secrecy::SecretString;

use crate::config::helpers::{
    optional_env, parse_env_or, required_env, split_list, validate_http_url,
};
use crate::error::ConfigError;

pub const DEFAULT_DISCORD_API_BASE_URL: &str = "https://discord.com/api/v10";

/// Discord application settings.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    /// Hex-encoded Ed25519 public key from the developer portal.
    pub public_key: String,
    pub bot_token: SecretString,
    pub application_id: String,
    /// Role ids allowed to run `/sendcredit`.
    pub admin_role_ids: BTreeSet<String>,
    pub api_base_url: String,
    /// Maximum distance between the signed timestamp and now.
    pub max_clock_skew: Duration,
    pub followup: FollowUpRetryConfig,
}

/// Bounded retry for follow-up delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowUpRetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for FollowUpRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl DiscordConfig {
    pub fn resolve() -> Result<Self, ConfigError> {
        let public_key = required_env(
            "DISCORD_PUBLIC_KEY",
            "Copy the application's public key from the Discord developer portal.",
        )?;
        let decoded = hex::decode(&public_key).map_err(|e| ConfigError::InvalidValue {
            key: "DISCORD_PUBLIC_KEY".to_string(),
            message: format!("must be hex: {e}"),
        })?;
        if decoded.len() != ed25519_dalek::PUBLIC_KEY_LENGTH {
            return Err(ConfigError::InvalidValue {
                key: "DISCORD_PUBLIC_KEY".to_string(),
                message: format!(
                    "expected {} bytes, got {}",
                    ed25519_dalek::PUBLIC_KEY_LENGTH,
                    decoded.len()
                ),
            });
        }

        let api_base_url = match optional_env("DISCORD_API_BASE_URL")? {
            Some(raw) => validate_http_url("DISCORD_API_BASE_URL", &raw)?,
            None => DEFAULT_DISCORD_API_BASE_URL.to_string(),
        };

        Ok(Self {
            public_key,
            bot_token: SecretString::from(required_env(
                "DISCORD_TOKEN",
                "Set the bot token used for command registration and follow-ups.",
            )?),
            application_id: required_env(
                "DISCORD_APPLICATION_ID",
                "Set the Discord application id.",
            )?,
            admin_role_ids: optional_env("DISCORD_ADMIN_ROLE_IDS")?
                .map(|raw| split_list(&raw).into_iter().collect())
                .unwrap_or_default(),
            api_base_url,
            max_clock_skew: Duration::from_secs(parse_env_or(
                "DISCORD_MAX_CLOCK_SKEW_SECS",
                300u64,
                "a number of seconds",
            )?),
            followup: FollowUpRetryConfig {
                max_retries: parse_env_or("DISCORD_FOLLOWUP_MAX_RETRIES", 2u32, "an integer")?,
                initial_backoff: Duration::from_millis(parse_env_or(
                    "DISCORD_FOLLOWUP_RETRY_BACKOFF_MS",
                    500u64,
                    "a number of milliseconds",
                )?),
            },
        })
    }
}
