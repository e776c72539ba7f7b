use std::sync::Arc;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use sqlx::SqliteConnection;

use super::{TokenDriver, DATABASE};
use crate::clock::{truncate_to_second, Clock};
use crate::errors::Result;
use crate::models::token::{stored_payload, Expiry, OwnerRef, Payload, TokenRecord};
use crate::query::{DeleteFilter, TokenCriteria};
use crate::store::{NewToken, SqlStore};

pub const SECRET_LENGTH: usize = 128;

/// Random opaque secrets persisted as rows; revocation soft-deletes rows.
pub struct DatabaseDriver {
    store: SqlStore,
    clock: Arc<dyn Clock>,
}

impl DatabaseDriver {
    pub fn new(store: SqlStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        truncate_to_second(self.clock.now())
    }
}

pub fn generate_secret() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(SECRET_LENGTH)
        .map(char::from)
        .collect()
}

#[async_trait]
impl TokenDriver for DatabaseDriver {
    fn name(&self) -> &str {
        DATABASE
    }

    async fn find(&self, secret: &str, criteria: &TokenCriteria) -> Result<Option<TokenRecord>> {
        self.store
            .find_token(secret, criteria, self.now())
            .await?
            .map(|row| row.into_record(DATABASE))
            .transpose()
    }

    async fn create(
        &self,
        owner: &OwnerRef,
        token_type: &str,
        expires: Option<Expiry>,
        payload: Payload,
    ) -> Result<TokenRecord> {
        let created_at = self.now();
        let expires_at = expires.map(|e| e.resolve(created_at)).transpose()?;
        let secret = generate_secret();

        let id = self
            .store
            .insert_token(&NewToken {
                token: &secret,
                model_class: &owner.owner_type,
                model_id: &owner.owner_id,
                token_type,
                data: stored_payload(&payload),
                expires_at,
                created_at,
            })
            .await?;

        Ok(TokenRecord::new(
            DATABASE,
            id.to_string(),
            owner.owner_type.clone(),
            owner.owner_id.clone(),
            token_type.to_string(),
            created_at,
            expires_at,
            payload,
            secret,
        ))
    }

    async fn delete_by(&self, conn: &mut SqliteConnection, filter: &DeleteFilter) -> Result<()> {
        let rows = self.store.soft_delete_tokens(conn, filter, self.now()).await?;
        tracing::debug!(rows, "soft-deleted database tokens");
        Ok(())
    }

    async fn force_delete_all(&self, conn: &mut SqliteConnection) -> Result<()> {
        let rows = self.store.soft_delete_all_tokens(conn, self.now()).await?;
        tracing::debug!(rows, "soft-deleted all database tokens");
        Ok(())
    }
}
