use async_trait::async_trait;
use chrono::Utc;

use super::{LibSqlBackend, fmt_ts, get_i64, get_text, get_ts, map_insert_error};
use crate::db::{Account, EntityStore, Participant};
use crate::error::DatabaseError;

#[async_trait]
impl EntityStore for LibSqlBackend {
    async fn get_account(&self, id: &str) -> Result<Option<Account>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT id, name, email, registration_complete, created_at FROM accounts WHERE id = ?1",
                libsql::params![id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(Account {
                id: get_text(&row, 0),
                name: get_text(&row, 1),
                email: get_text(&row, 2),
                registration_complete: get_i64(&row, 3) != 0,
                created_at: get_ts(&row, 4),
            })),
            None => Ok(None),
        }
    }

    async fn insert_account(&self, account: &Account) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO accounts (id, name, email, registration_complete, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            libsql::params![
                account.id.as_str(),
                account.name.as_str(),
                account.email.as_str(),
                i64::from(account.registration_complete),
                fmt_ts(&account.created_at)
            ],
        )
        .await
        .map_err(map_insert_error)?;
        Ok(())
    }

    async fn room_exists(&self, id: &str) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query("SELECT 1 FROM rooms WHERE id = ?1", libsql::params![id])
            .await?;
        Ok(rows.next().await?.is_some())
    }

    async fn insert_room(&self, id: &str) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO rooms (id, created_at) VALUES (?1, ?2)",
            libsql::params![id, fmt_ts(&Utc::now())],
        )
        .await
        .map_err(map_insert_error)?;
        Ok(())
    }

    async fn participant_exists(
        &self,
        account_id: &str,
        room_id: &str,
    ) -> Result<bool, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT 1 FROM participants WHERE account_id = ?1 AND room_id = ?2",
                libsql::params![account_id, room_id],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    async fn insert_participant(
        &self,
        account_id: &str,
        room_id: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO participants (account_id, room_id, created_at) VALUES (?1, ?2, ?3)",
            libsql::params![account_id, room_id, fmt_ts(&Utc::now())],
        )
        .await
        .map_err(map_insert_error)?;
        Ok(())
    }

    async fn list_participants(&self, room_id: &str) -> Result<Vec<Participant>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT account_id, room_id, created_at FROM participants WHERE room_id = ?1 ORDER BY created_at",
                libsql::params![room_id],
            )
            .await?;

        let mut participants = Vec::new();
        while let Some(row) = rows.next().await? {
            participants.push(Participant {
                account_id: get_text(&row, 0),
                room_id: get_text(&row, 1),
                created_at: get_ts(&row, 2),
            });
        }
        Ok(participants)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::libsql::test_backend;
    use crate::db::{Account, EntityStore};

    #[tokio::test]
    async fn test_duplicate_account_insert_is_constraint() {
        let (backend, _dir) = test_backend().await;
        let account = Account::new("42", "ferris");

        backend.insert_account(&account).await.unwrap();
        let err = backend.insert_account(&account).await.unwrap_err();
        assert!(err.is_unique_violation(), "unexpected error: {err}");

        let stored = backend.get_account("42").await.unwrap().unwrap();
        assert_eq!(stored.name, "ferris");
        assert_eq!(stored.email, "42@discord.user");
        assert!(stored.registration_complete);
    }

    #[tokio::test]
    async fn test_duplicate_participant_insert_is_constraint() {
        let (backend, _dir) = test_backend().await;

        backend.insert_participant("42", "room-1").await.unwrap();
        let err = backend.insert_participant("42", "room-1").await.unwrap_err();
        assert!(err.is_unique_violation(), "unexpected error: {err}");

        assert!(backend.participant_exists("42", "room-1").await.unwrap());
        assert!(!backend.participant_exists("42", "room-2").await.unwrap());
        assert_eq!(backend.list_participants("room-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_room_exists_after_insert() {
        let (backend, _dir) = test_backend().await;

        assert!(!backend.room_exists("room-1").await.unwrap());
        backend.insert_room("room-1").await.unwrap();
        assert!(backend.room_exists("room-1").await.unwrap());
        assert!(
            backend
                .insert_room("room-1")
                .await
                .unwrap_err()
                .is_unique_violation()
        );
    }
}
