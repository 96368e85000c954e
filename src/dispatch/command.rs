//! Parsing of slash command data into a typed request.

use serde_json::Value;

use crate::discord::commands::{
    AMOUNT_OPTION, GET_CREDIT_COMMAND, HELP_COMMAND, QUESTION_OPTION, REASON_OPTION,
    SEND_CREDIT_COMMAND, USER_OPTION,
};
use crate::discord::types::{CommandData, option_type};

/// A command as the dispatcher understands it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    Help {
        question: String,
    },
    SendCredit {
        receiver_id: String,
        amount: i64,
        reason: String,
    },
    /// `None` means the invoker's own balance.
    GetCredit {
        target_id: Option<String>,
    },
    /// A known command whose options are missing or mistyped.
    Invalid {
        command: String,
        reason: String,
    },
    Unrecognized {
        name: String,
    },
}

impl CommandRequest {
    pub fn name(&self) -> &str {
        match self {
            Self::Help { .. } => HELP_COMMAND,
            Self::SendCredit { .. } => SEND_CREDIT_COMMAND,
            Self::GetCredit { .. } => GET_CREDIT_COMMAND,
            Self::Invalid { command, .. } => command,
            Self::Unrecognized { name } => name,
        }
    }

    pub fn parse(data: &CommandData) -> Self {
        let parsed = match data.name.as_str() {
            HELP_COMMAND => parse_help(data),
            SEND_CREDIT_COMMAND => parse_send_credit(data),
            GET_CREDIT_COMMAND => parse_get_credit(data),
            other => {
                return Self::Unrecognized {
                    name: other.to_string(),
                };
            }
        };
        parsed.unwrap_or_else(|reason| Self::Invalid {
            command: data.name.clone(),
            reason,
        })
    }
}

/// Look up an option, checking its declared type. `Ok(None)` when absent.
fn option_value<'a>(
    data: &'a CommandData,
    name: &str,
    kind: u8,
) -> Result<Option<&'a Value>, String> {
    let Some(option) = data.option(name) else {
        return Ok(None);
    };
    if option.kind != kind {
        return Err(format!("`{name}` has the wrong type"));
    }
    Ok(option.value.as_ref())
}

fn string_option(data: &CommandData, name: &str, kind: u8) -> Result<Option<String>, String> {
    match option_value(data, name, kind)? {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(format!("`{name}` must be text")),
    }
}

fn parse_help(data: &CommandData) -> Result<CommandRequest, String> {
    let question = string_option(data, QUESTION_OPTION, option_type::STRING)?
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| format!("`{QUESTION_OPTION}` is required"))?;
    Ok(CommandRequest::Help { question })
}

fn parse_send_credit(data: &CommandData) -> Result<CommandRequest, String> {
    let receiver_id = string_option(data, USER_OPTION, option_type::USER)?
        .ok_or_else(|| format!("`{USER_OPTION}` is required"))?;
    let amount = match option_value(data, AMOUNT_OPTION, option_type::INTEGER)? {
        Some(value) => value
            .as_i64()
            .ok_or_else(|| format!("`{AMOUNT_OPTION}` must be a whole number"))?,
        None => return Err(format!("`{AMOUNT_OPTION}` is required")),
    };
    let reason = string_option(data, REASON_OPTION, option_type::STRING)?.unwrap_or_default();
    Ok(CommandRequest::SendCredit {
        receiver_id,
        amount,
        reason,
    })
}

fn parse_get_credit(data: &CommandData) -> Result<CommandRequest, String> {
    let target_id = string_option(data, USER_OPTION, option_type::USER)?;
    Ok(CommandRequest::GetCredit { target_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn data(raw: Value) -> CommandData {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn parses_help_question() {
        let request = CommandRequest::parse(&data(json!({
            "name": "help",
            "options": [{"name": "question", "type": 3, "value": "how do credits work?"}]
        })));
        assert_eq!(
            request,
            CommandRequest::Help {
                question: "how do credits work?".to_string()
            }
        );
    }

    #[test]
    fn parses_sendcredit_with_default_reason() {
        let request = CommandRequest::parse(&data(json!({
            "name": "sendcredit",
            "options": [
                {"name": "user", "type": 6, "value": "43"},
                {"name": "amount", "type": 4, "value": 7}
            ]
        })));
        assert_eq!(
            request,
            CommandRequest::SendCredit {
                receiver_id: "43".to_string(),
                amount: 7,
                reason: String::new(),
            }
        );
    }

    #[test]
    fn getcredit_target_is_optional() {
        assert_eq!(
            CommandRequest::parse(&data(json!({"name": "getcredit"}))),
            CommandRequest::GetCredit { target_id: None }
        );
        assert_eq!(
            CommandRequest::parse(&data(json!({
                "name": "getcredit",
                "options": [{"name": "user", "type": 6, "value": "43"}]
            }))),
            CommandRequest::GetCredit {
                target_id: Some("43".to_string())
            }
        );
    }

    #[test]
    fn missing_or_mistyped_options_are_invalid() {
        let missing = CommandRequest::parse(&data(json!({
            "name": "sendcredit",
            "options": [{"name": "user", "type": 6, "value": "43"}]
        })));
        assert!(matches!(
            missing,
            CommandRequest::Invalid { ref command, ref reason }
                if command == "sendcredit" && reason.contains("amount")
        ));

        let fractional = CommandRequest::parse(&data(json!({
            "name": "sendcredit",
            "options": [
                {"name": "user", "type": 6, "value": "43"},
                {"name": "amount", "type": 4, "value": 1.5}
            ]
        })));
        assert!(matches!(fractional, CommandRequest::Invalid { .. }));

        let wrong_kind = CommandRequest::parse(&data(json!({
            "name": "help",
            "options": [{"name": "question", "type": 4, "value": 3}]
        })));
        assert!(matches!(wrong_kind, CommandRequest::Invalid { .. }));

        let blank = CommandRequest::parse(&data(json!({
            "name": "help",
            "options": [{"name": "question", "type": 3, "value": "   "}]
        })));
        assert!(matches!(blank, CommandRequest::Invalid { .. }));
    }

    #[test]
    fn unknown_names_are_unrecognized() {
        let request = CommandRequest::parse(&data(json!({"name": "dance"})));
        assert_eq!(request.name(), "dance");
        assert_eq!(
            request,
            CommandRequest::Unrecognized {
                name: "dance".to_string()
            }
        );
    }
}
