//! creditagent: a Discord slash-command service.
//!
//! Signed interactions come in over HTTP, get acknowledged with a deferred
//! response, and are finished in a detached task that talks to an agent
//! runtime (`/help`) or the credit ledger (`/sendcredit`, `/getcredit`).

pub mod agent;
pub mod bootstrap;
pub mod config;
pub mod db;
pub mod discord;
pub mod dispatch;
pub mod entities;
pub mod error;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};
