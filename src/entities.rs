//! Idempotent bootstrap of account, room, and participant rows.
//!
//! Every operation reads first and inserts only when the row is absent.
//! A unique-constraint error on insert means a concurrent request won the
//! race, so it is reported as `Existing`.

use std::sync::Arc;

use secrecy::SecretString;

use crate::db::{Account, Database};
use crate::discord::IdentityLookup;
use crate::error::DatabaseError;

/// Outcome of an ensure call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    Created,
    Existing,
}

fn absorb_duplicate(result: Result<(), DatabaseError>) -> Result<Ensured, DatabaseError> {
    match result {
        Ok(()) => Ok(Ensured::Created),
        Err(e) if e.is_unique_violation() => Ok(Ensured::Existing),
        Err(e) => Err(e),
    }
}

#[derive(Clone)]
pub struct EntityBootstrap {
    store: Arc<dyn Database>,
    identity: Arc<dyn IdentityLookup>,
}

impl EntityBootstrap {
    pub fn new(store: Arc<dyn Database>, identity: Arc<dyn IdentityLookup>) -> Self {
        Self { store, identity }
    }

    /// Create the account if absent. Without a `name`, the display name is
    /// looked up through `credential`; a failed lookup falls back to the id.
    pub async fn ensure_account(
        &self,
        id: &str,
        name: Option<&str>,
        credential: Option<&SecretString>,
    ) -> Result<Ensured, DatabaseError> {
        if self.store.get_account(id).await?.is_some() {
            return Ok(Ensured::Existing);
        }

        let name = match (name, credential) {
            (Some(name), _) => name.to_string(),
            (None, Some(credential)) => match self.identity.display_name(credential).await {
                Ok(name) => name,
                Err(e) => {
                    tracing::warn!(account_id = %id, error = %e, "Display name lookup failed, using id");
                    id.to_string()
                }
            },
            (None, None) => id.to_string(),
        };

        let ensured = absorb_duplicate(self.store.insert_account(&Account::new(id, name)).await)?;
        if ensured == Ensured::Created {
            tracing::info!(account_id = %id, "Created account");
        }
        Ok(ensured)
    }

    pub async fn ensure_room(&self, id: &str) -> Result<Ensured, DatabaseError> {
        if self.store.room_exists(id).await? {
            return Ok(Ensured::Existing);
        }
        let ensured = absorb_duplicate(self.store.insert_room(id).await)?;
        if ensured == Ensured::Created {
            tracing::info!(room_id = %id, "Created room");
        }
        Ok(ensured)
    }

    pub async fn ensure_participant(
        &self,
        account_id: &str,
        room_id: &str,
    ) -> Result<Ensured, DatabaseError> {
        if self.store.participant_exists(account_id, room_id).await? {
            return Ok(Ensured::Existing);
        }
        let ensured = absorb_duplicate(self.store.insert_participant(account_id, room_id).await)?;
        if ensured == Ensured::Created {
            tracing::debug!(%account_id, %room_id, "Added participant");
        }
        Ok(ensured)
    }

    /// Whether the account row is present. Used to confirm a required row
    /// after a failed ensure.
    pub async fn account_present(&self, id: &str) -> bool {
        matches!(self.store.get_account(id).await, Ok(Some(_)))
    }

    pub async fn room_present(&self, id: &str) -> bool {
        matches!(self.store.room_exists(id).await, Ok(true))
    }
}
