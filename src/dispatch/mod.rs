//! Command dispatch: bootstrap the invoking entities, then run the command.
//!
//! `dispatch` is a plain async function over an explicit [`CommandContext`];
//! it always produces the text for the follow-up message and never panics
//! on store or runtime failures.

mod command;
mod deferred;

pub use command::CommandRequest;
pub use deferred::DeferredResponder;

use std::collections::BTreeSet;
use std::sync::Arc;

use secrecy::SecretString;

use crate::agent::{AgentMessage, AgentRuntime};
use crate::db::{Database, NewCreditTransfer};
use crate::discord::IdentityLookup;
use crate::discord::types::Interaction;
use crate::entities::{EntityBootstrap, Ensured};
use crate::error::DatabaseError;

/// Reply to any command this service does not know.
pub const DEFAULT_PROMPT: &str = "How can I assist you?";
pub const NOT_AUTHORIZED: &str = "You are not authorized to send credits.";

/// Static settings the dispatcher needs.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Roles allowed to run `/sendcredit`.
    pub admin_role_ids: BTreeSet<String>,
    /// Account id the agent answers as.
    pub agent_id: String,
    /// Used to resolve the agent's display name.
    pub bot_token: SecretString,
}

/// Everything a command needs, passed explicitly.
#[derive(Clone)]
pub struct CommandContext {
    settings: DispatchSettings,
    store: Arc<dyn Database>,
    bootstrap: EntityBootstrap,
    agent: Arc<dyn AgentRuntime>,
}

impl CommandContext {
    pub fn new(
        settings: DispatchSettings,
        store: Arc<dyn Database>,
        identity: Arc<dyn IdentityLookup>,
        agent: Arc<dyn AgentRuntime>,
    ) -> Self {
        Self {
            bootstrap: EntityBootstrap::new(Arc::clone(&store), identity),
            settings,
            store,
            agent,
        }
    }

    fn is_admin(&self, roles: &[String]) -> bool {
        roles
            .iter()
            .any(|role| self.settings.admin_role_ids.contains(role))
    }
}

/// The parsed, immutable part of an interaction the detached task works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub interaction_id: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub roles: Vec<String>,
    pub room_id: String,
    pub command: CommandRequest,
}

impl Invocation {
    /// Extract an invocation from an application command interaction.
    /// `None` when the interaction has no command data or no invoker.
    pub fn from_interaction(interaction: &Interaction) -> Option<Self> {
        let data = interaction.data.as_ref()?;
        let user = interaction.invoker()?;
        let room_id = interaction
            .channel_id
            .clone()
            .or_else(|| interaction.guild_id.clone())?;
        Some(Self {
            interaction_id: interaction.id.clone(),
            user_id: user.id.clone(),
            user_name: interaction.invoker_name().map(str::to_string),
            roles: interaction.roles().to_vec(),
            room_id,
            command: CommandRequest::parse(data),
        })
    }
}

/// Log a failed ensure and report whether the row is nonetheless there.
async fn confirm_required<F>(
    label: &str,
    id: &str,
    result: Result<Ensured, DatabaseError>,
    present: F,
) -> bool
where
    F: std::future::Future<Output = bool>,
{
    match result {
        Ok(_) => true,
        Err(e) => {
            tracing::error!(entity = label, id = %id, error = %e, "Bootstrap failed");
            let found = present.await;
            if found {
                tracing::info!(entity = label, id = %id, "Row present despite bootstrap failure");
            }
            found
        }
    }
}

fn log_optional(label: &str, id: &str, result: Result<Ensured, DatabaseError>) -> bool {
    match result {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(entity = label, id = %id, error = %e, "Bootstrap failed");
            false
        }
    }
}

/// Ensure the rows a command touches. Returns user-facing text on abort.
async fn bootstrap(ctx: &CommandContext, inv: &Invocation, needs_agent: bool) -> Result<(), String> {
    let bootstrap = &ctx.bootstrap;

    let account = bootstrap
        .ensure_account(&inv.user_id, inv.user_name.as_deref(), None)
        .await;
    if !confirm_required(
        "account",
        &inv.user_id,
        account,
        bootstrap.account_present(&inv.user_id),
    )
    .await
    {
        return Err("Sorry, I couldn't set up your account. Please try again later.".to_string());
    }

    let room = bootstrap.ensure_room(&inv.room_id).await;
    if !confirm_required("room", &inv.room_id, room, bootstrap.room_present(&inv.room_id)).await {
        return Err("Sorry, I couldn't set up this channel. Please try again later.".to_string());
    }

    let agent_id = ctx.settings.agent_id.as_str();
    let results = [
        (
            "agent account",
            agent_id,
            bootstrap
                .ensure_account(agent_id, None, Some(&ctx.settings.bot_token))
                .await,
        ),
        (
            "participant",
            inv.user_id.as_str(),
            bootstrap.ensure_participant(&inv.user_id, &inv.room_id).await,
        ),
        (
            "participant",
            agent_id,
            bootstrap.ensure_participant(agent_id, &inv.room_id).await,
        ),
    ];

    let mut complete = true;
    for (label, id, result) in results {
        complete &= log_optional(label, id, result);
    }
    if needs_agent && !complete {
        return Err("Sorry, I couldn't connect you with the agent. Please try again later.".to_string());
    }
    Ok(())
}

/// Run one command to completion and return the follow-up text.
pub async fn dispatch(ctx: &CommandContext, inv: &Invocation) -> String {
    match &inv.command {
        CommandRequest::Unrecognized { name } => {
            tracing::debug!(command = %name, "Unrecognized command");
            DEFAULT_PROMPT.to_string()
        }
        CommandRequest::Invalid { command, reason } => {
            format!("Invalid options for /{command}: {reason}")
        }
        CommandRequest::Help { question } => {
            if let Err(message) = bootstrap(ctx, inv, true).await {
                return message;
            }
            help(ctx, inv, question).await
        }
        CommandRequest::SendCredit {
            receiver_id,
            amount,
            reason,
        } => {
            if let Err(message) = bootstrap(ctx, inv, false).await {
                return message;
            }
            send_credit(ctx, inv, receiver_id, *amount, reason).await
        }
        CommandRequest::GetCredit { target_id } => {
            if let Err(message) = bootstrap(ctx, inv, false).await {
                return message;
            }
            get_credit(ctx, inv, target_id.as_deref()).await
        }
    }
}

async fn help(ctx: &CommandContext, inv: &Invocation, question: &str) -> String {
    let message = AgentMessage::new(
        question,
        &inv.user_id,
        &ctx.settings.agent_id,
        &inv.room_id,
    );
    match ctx.agent.handle_message(&message).await {
        Ok(reply) => format!("> {question}\n\n{}", reply.text),
        Err(e) => {
            tracing::error!(interaction_id = %inv.interaction_id, error = %e, "Agent runtime failed");
            format!("> {question}\n\nSorry, the agent could not answer right now: {e}")
        }
    }
}

async fn send_credit(
    ctx: &CommandContext,
    inv: &Invocation,
    receiver_id: &str,
    amount: i64,
    reason: &str,
) -> String {
    if !ctx.is_admin(&inv.roles) {
        tracing::warn!(user_id = %inv.user_id, "Unauthorized sendcredit attempt");
        return NOT_AUTHORIZED.to_string();
    }

    let transfer = NewCreditTransfer {
        sender_id: inv.user_id.clone(),
        receiver_id: receiver_id.to_string(),
        amount,
        reason: reason.to_string(),
    };
    match ctx.store.append_transfer(transfer).await {
        Ok(stored) => {
            tracing::info!(
                transfer_id = %stored.id,
                sender_id = %stored.sender_id,
                receiver_id = %stored.receiver_id,
                amount = stored.amount,
                "Recorded credit transfer"
            );
            if reason.is_empty() {
                format!("Sent {amount} credits to <@{receiver_id}>.")
            } else {
                format!("Sent {amount} credits to <@{receiver_id}> for: {reason}")
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to record credit transfer");
            "Sorry, the transfer could not be recorded. Please try again later.".to_string()
        }
    }
}

async fn get_credit(ctx: &CommandContext, inv: &Invocation, target_id: Option<&str>) -> String {
    let target = target_id.unwrap_or(&inv.user_id);
    match ctx.store.credit_balance(target).await {
        Ok(balance) if target == inv.user_id => format!("You have {balance} credits."),
        Ok(balance) => format!("<@{target}> has {balance} credits."),
        Err(e) => {
            tracing::error!(error = %e, receiver_id = %target, "Failed to read credit balance");
            "Sorry, I couldn't read the balance. Please try again later.".to_string()
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::agent::{AgentMessage, AgentReply, AgentRuntime};
    use crate::db::{
        Account, CreditTransfer, Database, EntityStore, LedgerStore, NewCreditTransfer,
        Participant,
    };
    use crate::error::{AgentError, DatabaseError};

    /// Agent runtime double that records messages and replies with a fixed text.
    #[derive(Default)]
    pub(crate) struct ScriptedAgent {
        pub reply: Option<String>,
        pub seen: Mutex<Vec<AgentMessage>>,
    }

    #[async_trait]
    impl AgentRuntime for ScriptedAgent {
        async fn handle_message(&self, message: &AgentMessage) -> Result<AgentReply, AgentError> {
            self.seen.lock().unwrap().push(message.clone());
            match &self.reply {
                Some(text) => Ok(AgentReply { text: text.clone() }),
                None => Err(AgentError::RequestFailed {
                    reason: "connection refused".to_string(),
                }),
            }
        }
    }

    fn down() -> DatabaseError {
        DatabaseError::Query("database is unavailable".to_string())
    }

    /// Store whose every call fails.
    pub(crate) struct UnavailableStore;

    #[async_trait]
    impl EntityStore for UnavailableStore {
        async fn get_account(&self, _id: &str) -> Result<Option<Account>, DatabaseError> {
            Err(down())
        }
        async fn insert_account(&self, _account: &Account) -> Result<(), DatabaseError> {
            Err(down())
        }
        async fn room_exists(&self, _id: &str) -> Result<bool, DatabaseError> {
            Err(down())
        }
        async fn insert_room(&self, _id: &str) -> Result<(), DatabaseError> {
            Err(down())
        }
        async fn participant_exists(&self, _a: &str, _r: &str) -> Result<bool, DatabaseError> {
            Err(down())
        }
        async fn insert_participant(&self, _a: &str, _r: &str) -> Result<(), DatabaseError> {
            Err(down())
        }
        async fn list_participants(&self, _r: &str) -> Result<Vec<Participant>, DatabaseError> {
            Err(down())
        }
    }

    #[async_trait]
    impl LedgerStore for UnavailableStore {
        async fn append_transfer(
            &self,
            _transfer: NewCreditTransfer,
        ) -> Result<CreditTransfer, DatabaseError> {
            Err(down())
        }
        async fn credit_balance(&self, _receiver_id: &str) -> Result<i64, DatabaseError> {
            Err(down())
        }
        async fn list_transfers(&self, _r: &str) -> Result<Vec<CreditTransfer>, DatabaseError> {
            Err(down())
        }
    }

    #[async_trait]
    impl Database for UnavailableStore {
        async fn run_migrations(&self) -> Result<(), DatabaseError> {
            Ok(())
        }
    }

    /// Real store with selected writes failing.
    pub(crate) struct FlakyStore {
        pub inner: Arc<dyn Database>,
        /// `insert_account` fails for this id.
        pub reject_account: Option<&'static str>,
        /// Every `insert_participant` fails.
        pub reject_participants: bool,
        /// `insert_room` writes the row, then reports an error anyway.
        pub room_insert_errors_after_write: bool,
    }

    impl FlakyStore {
        pub(crate) fn over(inner: Arc<dyn Database>) -> Self {
            Self {
                inner,
                reject_account: None,
                reject_participants: false,
                room_insert_errors_after_write: false,
            }
        }
    }

    #[async_trait]
    impl EntityStore for FlakyStore {
        async fn get_account(&self, id: &str) -> Result<Option<Account>, DatabaseError> {
            self.inner.get_account(id).await
        }
        async fn insert_account(&self, account: &Account) -> Result<(), DatabaseError> {
            if self.reject_account == Some(account.id.as_str()) {
                return Err(down());
            }
            self.inner.insert_account(account).await
        }
        async fn room_exists(&self, id: &str) -> Result<bool, DatabaseError> {
            self.inner.room_exists(id).await
        }
        async fn insert_room(&self, id: &str) -> Result<(), DatabaseError> {
            self.inner.insert_room(id).await?;
            if self.room_insert_errors_after_write {
                return Err(DatabaseError::Query("connection reset after commit".to_string()));
            }
            Ok(())
        }
        async fn participant_exists(&self, a: &str, r: &str) -> Result<bool, DatabaseError> {
            self.inner.participant_exists(a, r).await
        }
        async fn insert_participant(&self, a: &str, r: &str) -> Result<(), DatabaseError> {
            if self.reject_participants {
                return Err(down());
            }
            self.inner.insert_participant(a, r).await
        }
        async fn list_participants(&self, r: &str) -> Result<Vec<Participant>, DatabaseError> {
            self.inner.list_participants(r).await
        }
    }

    #[async_trait]
    impl LedgerStore for FlakyStore {
        async fn append_transfer(
            &self,
            transfer: NewCreditTransfer,
        ) -> Result<CreditTransfer, DatabaseError> {
            self.inner.append_transfer(transfer).await
        }
        async fn credit_balance(&self, receiver_id: &str) -> Result<i64, DatabaseError> {
            self.inner.credit_balance(receiver_id).await
        }
        async fn list_transfers(&self, r: &str) -> Result<Vec<CreditTransfer>, DatabaseError> {
            self.inner.list_transfers(r).await
        }
    }

    #[async_trait]
    impl Database for FlakyStore {
        async fn run_migrations(&self) -> Result<(), DatabaseError> {
            self.inner.run_migrations().await
        }
    }
}
