//! PostgreSQL backend for the Database trait.
//!
//! Uses a deadpool connection pool; schema changes are versioned refinery
//! migrations embedded from `migrations/`.

use async_trait::async_trait;
use deadpool_postgres::{Config as PoolSettings, Pool, PoolConfig, Runtime};
use secrecy::ExposeSecret;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

use crate::config::DatabaseConfig;
use crate::db::{
    Account, CreditTransfer, Database, EntityStore, LedgerStore, NewCreditTransfer, Participant,
};
use crate::error::DatabaseError;

mod embedded {
    refinery::embed_migrations!("migrations");
}

/// PostgreSQL database backend.
pub struct PgBackend {
    pool: Pool,
}

impl PgBackend {
    /// Create a new PostgreSQL backend from configuration.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let url = config
            .url
            .as_ref()
            .ok_or_else(|| DatabaseError::Pool("DATABASE_URL is not set".to_string()))?;

        let mut settings = PoolSettings::new();
        settings.url = Some(url.expose_secret().to_string());
        settings.pool = Some(PoolConfig::new(config.pool_size.max(1)));
        let pool = settings
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| DatabaseError::Pool(format!("Failed to build pool: {}", e)))?;

        // Fail fast on a bad URL instead of on the first interaction.
        let _conn = pool.get().await?;
        Ok(Self { pool })
    }
}

/// Map an insert failure, surfacing duplicate keys as `Constraint`.
fn map_insert_error(e: tokio_postgres::Error) -> DatabaseError {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        DatabaseError::Constraint(e.to_string())
    } else {
        DatabaseError::Postgres(e)
    }
}

fn row_to_transfer(row: &Row) -> CreditTransfer {
    CreditTransfer {
        id: row.get("id"),
        sender_id: row.get("sender_id"),
        receiver_id: row.get("receiver_id"),
        amount: row.get("amount"),
        reason: row.get("reason"),
        created_at: row.get("created_at"),
    }
}

// ==================== Database (supertrait) ====================

#[async_trait]
impl Database for PgBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let mut conn = self.pool.get().await?;
        let report = embedded::migrations::runner()
            .run_async(&mut **conn)
            .await
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        for migration in report.applied_migrations() {
            tracing::info!(
                version = migration.version(),
                name = migration.name(),
                "Applied migration"
            );
        }
        Ok(())
    }
}

// ==================== EntityStore ====================

#[async_trait]
impl EntityStore for PgBackend {
    async fn get_account(&self, id: &str) -> Result<Option<Account>, DatabaseError> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                "SELECT id, name, email, registration_complete, created_at FROM accounts WHERE id = $1",
                &[&id],
            )
            .await?;
        Ok(row.map(|row| Account {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            registration_complete: row.get("registration_complete"),
            created_at: row.get("created_at"),
        }))
    }

    async fn insert_account(&self, account: &Account) -> Result<(), DatabaseError> {
        let conn = self.pool.get().await?;
        conn.execute(
            "INSERT INTO accounts (id, name, email, registration_complete, created_at) VALUES ($1, $2, $3, $4, $5)",
            &[
                &account.id,
                &account.name,
                &account.email,
                &account.registration_complete,
                &account.created_at,
            ],
        )
        .await
        .map_err(map_insert_error)?;
        Ok(())
    }

    async fn room_exists(&self, id: &str) -> Result<bool, DatabaseError> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt("SELECT 1 FROM rooms WHERE id = $1", &[&id])
            .await?;
        Ok(row.is_some())
    }

    async fn insert_room(&self, id: &str) -> Result<(), DatabaseError> {
        let conn = self.pool.get().await?;
        conn.execute("INSERT INTO rooms (id) VALUES ($1)", &[&id])
            .await
            .map_err(map_insert_error)?;
        Ok(())
    }

    async fn participant_exists(
        &self,
        account_id: &str,
        room_id: &str,
    ) -> Result<bool, DatabaseError> {
        let conn = self.pool.get().await?;
        let row = conn
            .query_opt(
                "SELECT 1 FROM participants WHERE account_id = $1 AND room_id = $2",
                &[&account_id, &room_id],
            )
            .await?;
        Ok(row.is_some())
    }

    async fn insert_participant(
        &self,
        account_id: &str,
        room_id: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.pool.get().await?;
        conn.execute(
            "INSERT INTO participants (account_id, room_id) VALUES ($1, $2)",
            &[&account_id, &room_id],
        )
        .await
        .map_err(map_insert_error)?;
        Ok(())
    }

    async fn list_participants(&self, room_id: &str) -> Result<Vec<Participant>, DatabaseError> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                "SELECT account_id, room_id, created_at FROM participants WHERE room_id = $1 ORDER BY created_at",
                &[&room_id],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| Participant {
                account_id: row.get("account_id"),
                room_id: row.get("room_id"),
                created_at: row.get("created_at"),
            })
            .collect())
    }
}

// ==================== LedgerStore ====================

#[async_trait]
impl LedgerStore for PgBackend {
    async fn append_transfer(
        &self,
        transfer: NewCreditTransfer,
    ) -> Result<CreditTransfer, DatabaseError> {
        let transfer = transfer.into_transfer();
        let conn = self.pool.get().await?;
        conn.execute(
            "INSERT INTO credit_transfers (id, sender_id, receiver_id, amount, reason, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &transfer.id,
                &transfer.sender_id,
                &transfer.receiver_id,
                &transfer.amount,
                &transfer.reason,
                &transfer.created_at,
            ],
        )
        .await?;
        Ok(transfer)
    }

    async fn credit_balance(&self, receiver_id: &str) -> Result<i64, DatabaseError> {
        let conn = self.pool.get().await?;
        // SUM over BIGINT yields NUMERIC in Postgres.
        let row = conn
            .query_one(
                "SELECT COALESCE(SUM(amount), 0)::BIGINT AS balance FROM credit_transfers WHERE receiver_id = $1",
                &[&receiver_id],
            )
            .await?;
        Ok(row.get("balance"))
    }

    async fn list_transfers(
        &self,
        receiver_id: &str,
    ) -> Result<Vec<CreditTransfer>, DatabaseError> {
        let conn = self.pool.get().await?;
        let rows = conn
            .query(
                r#"
                SELECT id, sender_id, receiver_id, amount, reason, created_at
                FROM credit_transfers
                WHERE receiver_id = $1
                ORDER BY created_at DESC
                "#,
                &[&receiver_id],
            )
            .await?;
        Ok(rows.iter().map(row_to_transfer).collect())
    }
}
