//! Outbound calls to the Discord HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::discord::commands::CommandDefinition;
use crate::error::DiscordError;

/// Resolves the display name behind a bot credential.
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn display_name(&self, credential: &SecretString) -> Result<String, DiscordError>;
}

/// The Discord calls the service makes after verification.
#[async_trait]
pub trait DiscordApi: IdentityLookup {
    /// Replace the deferred placeholder with the final text.
    async fn edit_original_response(
        &self,
        interaction_token: &str,
        content: &str,
    ) -> Result<(), DiscordError>;

    /// Overwrite the application's global command set. Returns how many
    /// commands Discord now reports.
    async fn register_commands(
        &self,
        commands: &[CommandDefinition],
    ) -> Result<usize, DiscordError>;
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    #[serde(default)]
    username: String,
    #[serde(default)]
    global_name: Option<String>,
}

/// reqwest-backed Discord client.
pub struct HttpDiscordClient {
    client: Client,
    base_url: String,
    application_id: String,
    bot_token: SecretString,
}

impl HttpDiscordClient {
    pub fn new(
        base_url: impl Into<String>,
        application_id: impl Into<String>,
        bot_token: SecretString,
    ) -> Result<Self, DiscordError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!(
                "DiscordBot (",
                env!("CARGO_PKG_NAME"),
                ", ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            application_id: application_id.into(),
            bot_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turn non-success statuses into typed errors.
async fn check_status(operation: &str, response: Response) -> Result<Response, DiscordError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64);
        return Err(DiscordError::RateLimited {
            operation: operation.to_string(),
            retry_after,
        });
    }
    let body = response.text().await.unwrap_or_default();
    Err(DiscordError::Status {
        operation: operation.to_string(),
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl IdentityLookup for HttpDiscordClient {
    async fn display_name(&self, credential: &SecretString) -> Result<String, DiscordError> {
        let response = self
            .client
            .get(self.url("/users/@me"))
            .header(
                "Authorization",
                format!("Bot {}", credential.expose_secret()),
            )
            .send()
            .await?;
        let user: CurrentUser = check_status("get_current_user", response)
            .await?
            .json()
            .await
            .map_err(|e| DiscordError::InvalidResponse {
                operation: "get_current_user".to_string(),
                reason: e.to_string(),
            })?;
        Ok(user
            .global_name
            .filter(|name| !name.is_empty())
            .unwrap_or(user.username))
    }
}

#[async_trait]
impl DiscordApi for HttpDiscordClient {
    async fn edit_original_response(
        &self,
        interaction_token: &str,
        content: &str,
    ) -> Result<(), DiscordError> {
        let path = format!(
            "/webhooks/{}/{}/messages/@original",
            self.application_id, interaction_token
        );
        let response = self
            .client
            .patch(self.url(&path))
            .json(&serde_json::json!({ "content": content }))
            .send()
            .await
            .map_err(|e| DiscordError::RequestFailed {
                operation: "edit_original_response".to_string(),
                reason: e.to_string(),
            })?;
        check_status("edit_original_response", response).await?;
        Ok(())
    }

    async fn register_commands(
        &self,
        commands: &[CommandDefinition],
    ) -> Result<usize, DiscordError> {
        let path = format!("/applications/{}/commands", self.application_id);
        let response = self
            .client
            .put(self.url(&path))
            .header(
                "Authorization",
                format!("Bot {}", self.bot_token.expose_secret()),
            )
            .json(commands)
            .send()
            .await?;
        let registered: Vec<serde_json::Value> = check_status("register_commands", response)
            .await?
            .json()
            .await
            .map_err(|e| DiscordError::InvalidResponse {
                operation: "register_commands".to_string(),
                reason: e.to_string(),
            })?;
        Ok(registered.len())
    }
}
