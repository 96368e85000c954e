//! Discord interaction plumbing: wire types, signature checks, the outbound
//! HTTP client, and the slash command set.

pub mod api;
pub mod commands;
pub mod types;
pub mod verify;

pub use api::{DiscordApi, HttpDiscordClient, IdentityLookup};
pub use commands::{CommandDefinition, command_definitions};
pub use types::{Interaction, InteractionResponse, InteractionType, truncate_message};
pub use verify::{InteractionRejection, InteractionVerifier};
