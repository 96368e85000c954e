//! Client side of the external agent runtime that answers `/help`.

mod runtime;

pub use runtime::HttpAgentRuntime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub text: String,
}

/// One user message forwarded to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub content: MessageContent,
    pub sender_id: String,
    pub agent_id: String,
    pub participant_ids: Vec<String>,
    pub room_id: String,
}

impl AgentMessage {
    pub fn new(
        text: impl Into<String>,
        sender_id: impl Into<String>,
        agent_id: impl Into<String>,
        room_id: impl Into<String>,
    ) -> Self {
        let sender_id = sender_id.into();
        let agent_id = agent_id.into();
        Self {
            content: MessageContent { text: text.into() },
            participant_ids: vec![sender_id.clone(), agent_id.clone()],
            sender_id,
            agent_id,
            room_id: room_id.into(),
        }
    }
}

/// The runtime's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub text: String,
}

#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn handle_message(&self, message: &AgentMessage) -> Result<AgentReply, AgentError>;
}
