use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{TokenDriver, STATELESS};
use crate::clock::{truncate_to_second, Clock};
use crate::codec::{Claims, TokenCodec};
use crate::errors::Result;
use crate::models::blacklist::NewBlacklistEntry;
use crate::models::token::{Expiry, OwnerRef, Payload, TokenRecord};
use crate::query::{DeleteFilter, TokenCriteria};
use crate::store::SqlStore;

/// Self-contained encrypted tokens. Nothing is stored at issue time;
/// revocation appends rules to the blacklist table.
pub struct StatelessDriver {
    store: SqlStore,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
}

impl StatelessDriver {
    pub fn new(store: SqlStore, codec: TokenCodec, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            codec,
            clock,
        }
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        truncate_to_second(self.clock.now())
    }
}

#[async_trait]
impl TokenDriver for StatelessDriver {
    fn name(&self) -> &str {
        STATELESS
    }

    async fn find(&self, secret: &str, criteria: &TokenCriteria) -> Result<Option<TokenRecord>> {
        let claims = match self.codec.decode(secret) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::debug!(error = %e, "rejected stateless token");
                return Ok(None);
            }
        };

        let record = TokenRecord::new(
            STATELESS,
            claims.id,
            claims.owner_type,
            claims.owner_id,
            claims.token_type,
            claims.created_at,
            claims.expires_at,
            claims.payload,
            secret.to_string(),
        );

        if !record.is_live_at(self.now()) || !criteria.matches(&record) {
            return Ok(None);
        }
        if self.store.is_blacklisted(&record).await? {
            tracing::debug!(token_id = %record.id(), "stateless token is revoked");
            return Ok(None);
        }
        Ok(Some(record))
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

        let claims = Claims {
            id: Uuid::now_v7().to_string(),
            owner_type: owner.owner_type.clone(),
            owner_id: owner.owner_id.clone(),
            token_type: token_type.to_string(),
            created_at,
            expires_at,
            payload,
        };
        let secret = self.codec.encode(&claims)?;

        Ok(TokenRecord::new(
            STATELESS,
            claims.id,
            claims.owner_type,
            claims.owner_id,
            claims.token_type,
            claims.created_at,
            claims.expires_at,
            claims.payload,
            secret,
        ))
    }

    async fn delete_by(&self, conn: &mut SqliteConnection, filter: &DeleteFilter) -> Result<()> {
        self.store
            .insert_blacklist_entry(conn, &filter.to_blacklist_entry(), self.now())
            .await
    }

    async fn force_delete_all(&self, conn: &mut SqliteConnection) -> Result<()> {
        self.store
            .insert_blacklist_entry(conn, &NewBlacklistEntry::wildcard(), self.now())
            .await
    }
}
