use async_trait::async_trait;
use uuid::Uuid;

use super::{LibSqlBackend, fmt_ts, get_i64, get_text, get_ts};
use crate::db::{CreditTransfer, LedgerStore, NewCreditTransfer};
use crate::error::DatabaseError;

#[async_trait]
impl LedgerStore for LibSqlBackend {
    async fn append_transfer(
        &self,
        transfer: NewCreditTransfer,
    ) -> Result<CreditTransfer, DatabaseError> {
        let transfer = transfer.into_transfer();
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO credit_transfers (id, sender_id, receiver_id, amount, reason, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            libsql::params![
                transfer.id.to_string(),
                transfer.sender_id.as_str(),
                transfer.receiver_id.as_str(),
                transfer.amount,
                transfer.reason.as_str(),
                fmt_ts(&transfer.created_at)
            ],
        )
        .await?;
        Ok(transfer)
    }

    async fn credit_balance(&self, receiver_id: &str) -> Result<i64, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                "SELECT COALESCE(SUM(amount), 0) FROM credit_transfers WHERE receiver_id = ?1",
                libsql::params![receiver_id],
            )
            .await?;
        Ok(rows
            .next()
            .await?
            .map(|row| get_i64(&row, 0))
            .unwrap_or(0))
    }

    async fn list_transfers(
        &self,
        receiver_id: &str,
    ) -> Result<Vec<CreditTransfer>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                r#"
                SELECT id, sender_id, receiver_id, amount, reason, created_at
                FROM credit_transfers
                WHERE receiver_id = ?1
                ORDER BY created_at DESC, rowid DESC
                "#,
                libsql::params![receiver_id],
            )
            .await?;

        let mut transfers = Vec::new();
        while let Some(row) = rows.next().await? {
            transfers.push(CreditTransfer {
                id: Uuid::parse_str(&get_text(&row, 0))
                    .map_err(|e| DatabaseError::Query(e.to_string()))?,
                sender_id: get_text(&row, 1),
                receiver_id: get_text(&row, 2),
                amount: get_i64(&row, 3),
                reason: get_text(&row, 4),
                created_at: get_ts(&row, 5),
            });
        }
        Ok(transfers)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::libsql::test_backend;
    use crate::db::{LedgerStore, NewCreditTransfer};

    fn transfer(sender: &str, receiver: &str, amount: i64) -> NewCreditTransfer {
        NewCreditTransfer {
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            amount,
            reason: String::new(),
        }
    }

    #[tokio::test]
    async fn test_balance_sums_by_receiver() {
        let (backend, _dir) = test_backend().await;

        backend.append_transfer(transfer("A", "X", 10)).await.unwrap();
        backend.append_transfer(transfer("B", "X", 5)).await.unwrap();
        backend.append_transfer(transfer("A", "Y", 3)).await.unwrap();

        assert_eq!(backend.credit_balance("X").await.unwrap(), 15);
        assert_eq!(backend.credit_balance("Y").await.unwrap(), 3);
        assert_eq!(backend.credit_balance("Z").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_negative_amounts_reduce_balance() {
        let (backend, _dir) = test_backend().await;

        backend.append_transfer(transfer("A", "X", 10)).await.unwrap();
        backend.append_transfer(transfer("A", "X", -4)).await.unwrap();

        assert_eq!(backend.credit_balance("X").await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_list_transfers_round_trips_fields() {
        let (backend, _dir) = test_backend().await;

        let stored = backend
            .append_transfer(NewCreditTransfer {
                sender_id: "A".to_string(),
                receiver_id: "X".to_string(),
                amount: 7,
                reason: "bonus".to_string(),
            })
            .await
            .unwrap();

        let listed = backend.list_transfers("X").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, stored.id);
        assert_eq!(listed[0].sender_id, "A");
        assert_eq!(listed[0].amount, 7);
        assert_eq!(listed[0].reason, "bonus");
        assert!(backend.list_transfers("Y").await.unwrap().is_empty());
    }
}
