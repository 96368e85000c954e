//! Slash command definitions registered with Discord.

use serde::Serialize;

use crate::discord::types::option_type;

pub const HELP_COMMAND: &str = "help";
pub const SEND_CREDIT_COMMAND: &str = "sendcredit";
pub const GET_CREDIT_COMMAND: &str = "getcredit";

pub const QUESTION_OPTION: &str = "question";
pub const USER_OPTION: &str = "user";
pub const AMOUNT_OPTION: &str = "amount";
pub const REASON_OPTION: &str = "reason";

/// `type` of a chat-input (slash) command.
const CHAT_INPUT: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOptionDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "type")]
    pub kind: u8,
    pub required: bool,
}

impl CommandOptionDefinition {
    fn required(name: &'static str, description: &'static str, kind: u8) -> Self {
        Self {
            name,
            description,
            kind,
            required: true,
        }
    }

    fn optional(name: &'static str, description: &'static str, kind: u8) -> Self {
        Self {
            name,
            description,
            kind,
            required: false,
        }
    }
}

/// Body element of `PUT /applications/{id}/commands`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "type")]
    pub kind: u8,
    pub options: Vec<CommandOptionDefinition>,
}

/// The full command set. Registration overwrites whatever Discord had.
pub fn command_definitions() -> Vec<CommandDefinition> {
    vec![
        CommandDefinition {
            name: HELP_COMMAND,
            description: "Ask the agent a question",
            kind: CHAT_INPUT,
            options: vec![CommandOptionDefinition::required(
                QUESTION_OPTION,
                "What do you need help with?",
                option_type::STRING,
            )],
        },
        CommandDefinition {
            name: SEND_CREDIT_COMMAND,
            description: "Send credits to a user (admins only)",
            kind: CHAT_INPUT,
            options: vec![
                CommandOptionDefinition::required(
                    USER_OPTION,
                    "Who receives the credits",
                    option_type::USER,
                ),
                CommandOptionDefinition::required(
                    AMOUNT_OPTION,
                    "How many credits",
                    option_type::INTEGER,
                ),
                CommandOptionDefinition::optional(
                    REASON_OPTION,
                    "Why the credits are sent",
                    option_type::STRING,
                ),
            ],
        },
        CommandDefinition {
            name: GET_CREDIT_COMMAND,
            description: "Show a user's credit balance",
            kind: CHAT_INPUT,
            options: vec![CommandOptionDefinition::optional(
                USER_OPTION,
                "Whose balance to show (defaults to you)",
                option_type::USER,
            )],
        },
    ]
}
