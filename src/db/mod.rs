//! Persistence for accounts, rooms, participants, and the credit ledger.
//!
//! The store is split into focused traits (`EntityStore`, `LedgerStore`)
//! joined by the `Database` supertrait. Two backends implement it:
//! PostgreSQL (pooled, refinery migrations) and libSQL (embedded file or
//! Turso replica).

#[cfg(feature = "libsql")]
pub mod libsql;
#[cfg(feature = "libsql")]
pub(crate) mod libsql_migrations;
#[cfg(feature = "postgres")]
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{DatabaseBackend, DatabaseConfig};
use crate::error::DatabaseError;

/// A Discord user or the bot itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    /// Synthetic handle; Discord never shares real addresses with bots.
    pub email: String,
    pub registration_complete: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// A freshly registered account for a Discord id.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            email: format!("{id}@discord.user"),
            id,
            name: name.into(),
            registration_complete: true,
            created_at: Utc::now(),
        }
    }
}

/// A conversation channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Membership of an account in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub account_id: String,
    pub room_id: String,
    pub created_at: DateTime<Utc>,
}

/// One append-only ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditTransfer {
    pub id: Uuid,
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: i64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry before it is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCreditTransfer {
    pub sender_id: String,
    pub receiver_id: String,
    pub amount: i64,
    pub reason: String,
}

impl NewCreditTransfer {
    pub(crate) fn into_transfer(self) -> CreditTransfer {
        CreditTransfer {
            id: Uuid::new_v4(),
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            amount: self.amount,
            reason: self.reason,
            created_at: Utc::now(),
        }
    }
}

/// Existence checks and plain inserts for bootstrap entities.
///
/// Inserts never update. A duplicate key must surface as
/// `DatabaseError::Constraint` so callers can treat it as "already there".
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get_account(&self, id: &str) -> Result<Option<Account>, DatabaseError>;

    async fn insert_account(&self, account: &Account) -> Result<(), DatabaseError>;

    async fn room_exists(&self, id: &str) -> Result<bool, DatabaseError>;

    async fn insert_room(&self, id: &str) -> Result<(), DatabaseError>;

    async fn participant_exists(
        &self,
        account_id: &str,
        room_id: &str,
    ) -> Result<bool, DatabaseError>;

    async fn insert_participant(&self, account_id: &str, room_id: &str)
    -> Result<(), DatabaseError>;

    async fn list_participants(&self, room_id: &str) -> Result<Vec<Participant>, DatabaseError>;
}

/// Append-only credit ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append_transfer(
        &self,
        transfer: NewCreditTransfer,
    ) -> Result<CreditTransfer, DatabaseError>;

    /// Sum of amounts received. Zero when there are no rows.
    async fn credit_balance(&self, receiver_id: &str) -> Result<i64, DatabaseError>;

    /// Transfers received, newest first.
    async fn list_transfers(&self, receiver_id: &str)
    -> Result<Vec<CreditTransfer>, DatabaseError>;
}

/// Full store surface used by the service.
#[async_trait]
pub trait Database: EntityStore + LedgerStore + Send + Sync {
    async fn run_migrations(&self) -> Result<(), DatabaseError>;
}

/// Open the configured backend and bring its schema up to date.
pub async fn connect_from_config(
    config: &DatabaseConfig,
) -> Result<Arc<dyn Database>, DatabaseError> {
    let db: Arc<dyn Database> = match config.backend {
        #[cfg(feature = "postgres")]
        DatabaseBackend::Postgres => Arc::new(self::postgres::PgBackend::new(config).await?),
        #[cfg(feature = "libsql")]
        DatabaseBackend::LibSql => {
            use secrecy::ExposeSecret;

            let backend = match (&config.libsql_url, &config.libsql_auth_token) {
                (Some(url), Some(token)) => {
                    self::libsql::LibSqlBackend::new_remote_replica(
                        &config.libsql_path,
                        url,
                        token.expose_secret(),
                    )
                    .await?
                }
                _ => self::libsql::LibSqlBackend::new_local(&config.libsql_path).await?,
            };
            Arc::new(backend)
        }
        #[allow(unreachable_patterns)]
        other => {
            return Err(DatabaseError::Pool(format!(
                "backend {other:?} is not compiled into this build"
            )));
        }
    };
    db.run_migrations().await?;
    tracing::info!(backend = ?config.backend, "Database ready");
    Ok(db)
}
