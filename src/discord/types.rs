//! Interaction wire types, limited to the fields this service reads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Discord's hard limit on message content length.
pub const MAX_MESSAGE_LEN: usize = 2000;

/// Interaction `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "u8")]
pub enum InteractionType {
    Ping,
    ApplicationCommand,
    MessageComponent,
    Autocomplete,
    ModalSubmit,
    Other(u8),
}

impl From<u8> for InteractionType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Ping,
            2 => Self::ApplicationCommand,
            3 => Self::MessageComponent,
            4 => Self::Autocomplete,
            5 => Self::ModalSubmit,
            other => Self::Other(other),
        }
    }
}

/// Application command option `type` values used by our commands.
pub mod option_type {
    pub const STRING: u8 = 3;
    pub const INTEGER: u8 = 4;
    pub const USER: u8 = 6;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
}

impl User {
    /// Name shown in Discord: the global display name when set.
    pub fn display_name(&self) -> &str {
        self.global_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.username)
    }
}

/// Guild member wrapper; only present for interactions inside a guild.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

impl CommandData {
    pub fn option(&self, name: &str) -> Option<&CommandOption> {
        self.options.iter().find(|option| option.name == name)
    }
}

/// An inbound interaction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub application_id: String,
    #[serde(rename = "type")]
    pub kind: InteractionType,
    #[serde(default)]
    pub data: Option<CommandData>,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub member: Option<Member>,
    /// Set instead of `member` for interactions in DMs.
    #[serde(default)]
    pub user: Option<User>,
    pub token: String,
}

impl Interaction {
    /// The user who invoked the interaction.
    pub fn invoker(&self) -> Option<&User> {
        self.member
            .as_ref()
            .and_then(|member| member.user.as_ref())
            .or(self.user.as_ref())
    }

    /// Name to register for the invoker: guild nickname first.
    pub fn invoker_name(&self) -> Option<&str> {
        self.member
            .as_ref()
            .and_then(|member| member.nick.as_deref())
            .filter(|nick| !nick.is_empty())
            .or_else(|| self.invoker().map(User::display_name))
    }

    /// Guild role ids of the invoker. Empty in DMs.
    pub fn roles(&self) -> &[String] {
        self.member
            .as_ref()
            .map(|member| member.roles.as_slice())
            .unwrap_or(&[])
    }
}

/// Interaction callback `type` values.
pub mod callback_type {
    pub const PONG: u8 = 1;
    pub const DEFERRED_CHANNEL_MESSAGE: u8 = 5;
}

/// Synchronous reply to an interaction request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: u8,
}

impl InteractionResponse {
    pub fn pong() -> Self {
        Self {
            kind: callback_type::PONG,
        }
    }

    /// "Bot is thinking"; the real answer arrives as a follow-up edit.
    pub fn deferred() -> Self {
        Self {
            kind: callback_type::DEFERRED_CHANNEL_MESSAGE,
        }
    }
}

/// Clamp text to Discord's message limit, ending in an ellipsis when cut.
pub fn truncate_message(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_LEN {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_MESSAGE_LEN - 1).collect();
    out.push('…');
    out
}
