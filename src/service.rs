//! The token router: picks drivers, enforces owner capabilities and
//! fans revocation out across every enabled driver.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::codec::TokenCodec;
use crate::config::TokenConfig;
use crate::drivers::DriverManager;
use crate::errors::{Result, TokenError};
use crate::models::owner::{OwnerRegistry, OwnerResolver, Tokenable};
use crate::models::token::{Expiry, OwnerRef, Payload, TokenRecord};
use crate::query::{DeleteFilter, TokenCriteria, TokenQuery};
use crate::store::SqlStore;

/// Optional settings for a new token.
#[derive(Debug, Clone, Default)]
pub struct TokenOptions {
    pub expires: Option<Expiry>,
    pub payload: Payload,
    /// Driver to issue with; the default driver when `None`.
    pub driver: Option<String>,
}

impl TokenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expires(mut self, expires: impl Into<Expiry>) -> Self {
        self.expires = Some(expires.into());
        self
    }

    pub fn payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }
}

pub struct TokenService {
    drivers: DriverManager,
    registry: OwnerRegistry,
    store: SqlStore,
}

impl TokenService {
    pub fn new(config: &TokenConfig, store: SqlStore, codec: TokenCodec) -> Result<Self> {
        Self::with_clock(config, store, codec, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: &TokenConfig,
        store: SqlStore,
        codec: TokenCodec,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let drivers = DriverManager::from_config(config, &store, &codec, clock)?;
        Ok(Self::from_parts(drivers, config.owner_registry(), store))
    }

    /// Assemble from an already-built driver set, e.g. with custom drivers.
    pub fn from_parts(drivers: DriverManager, registry: OwnerRegistry, store: SqlStore) -> Self {
        Self {
            drivers,
            registry,
            store,
        }
    }

    pub fn drivers(&self) -> &DriverManager {
        &self.drivers
    }

    pub fn registry(&self) -> &OwnerRegistry {
        &self.registry
    }

    pub fn store(&self) -> &SqlStore {
        &self.store
    }

    // -- Issue --

    pub async fn create(
        &self,
        owner: &OwnerRef,
        token_type: &str,
        options: TokenOptions,
    ) -> Result<TokenRecord> {
        self.registry.ensure_accepts(&owner.owner_type, token_type)?;

        let driver = match options.driver.as_deref() {
            Some(name) => self.drivers.driver(name)?,
            None => self.drivers.default_driver(),
        };

        let record = driver
            .create(owner, token_type, options.expires, options.payload)
            .await?;
        tracing::info!(
            driver = driver.name(),
            token_id = %record.id(),
            owner_type = %owner.owner_type,
            owner_id = %owner.owner_id,
            token_type,
            "token issued"
        );
        Ok(record)
    }

    pub async fn create_for<T: Tokenable>(
        &self,
        owner: &T,
        token_type: &str,
        options: TokenOptions,
    ) -> Result<TokenRecord> {
        self.create(&owner.owner_ref(), token_type, options).await
    }

    // -- Lookup --

    pub fn query(&self) -> TokenQuery<'_> {
        TokenQuery::new(self)
    }

    pub async fn find(&self, secret: &str) -> Result<Option<TokenRecord>> {
        self.query().find(secret).await
    }

    pub async fn find_or_fail(&self, secret: &str) -> Result<TokenRecord> {
        self.query().find_or_fail(secret).await
    }

    pub(crate) async fn find_matching(
        &self,
        secret: &str,
        criteria: &TokenCriteria,
    ) -> Result<Option<TokenRecord>> {
        criteria.validate()?;
        if let (Some(owner_type), Some(token_type)) = (criteria.owner_type(), criteria.token_type()) {
            self.registry.ensure_accepts(owner_type, token_type)?;
        }

        for driver in self.drivers.lookup_order() {
            if let Some(record) = driver.find(secret, criteria).await? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    // -- Revocation --

    /// Revoke every token matching `filter` in every enabled driver. Either
    /// all drivers record the revocation or none do.
    pub async fn delete_by(&self, filter: &DeleteFilter) -> Result<()> {
        let criteria = filter.criteria();
        if let Some(owner_type) = criteria.owner_type() {
            match criteria.token_type() {
                Some(token_type) => self.registry.ensure_accepts(owner_type, token_type)?,
                None => self.registry.ensure_registered(owner_type)?,
            }
        }

        let mut tx = self.store.pool().begin().await?;
        for driver in self.drivers.drivers() {
            driver.delete_by(&mut *tx, filter).await?;
        }
        tx.commit().await?;

        let owner_id = criteria.owner().map(|o| o.owner_id.to_string());
        tracing::info!(
            owner_type = criteria.owner_type(),
            owner_id = owner_id.as_deref(),
            token_type = criteria.token_type(),
            token_id = filter.id(),
            "tokens revoked"
        );
        Ok(())
    }

    /// Convenience form of [`delete_by`](Self::delete_by) with every filter optional.
    pub async fn delete_where(
        &self,
        owner: Option<OwnerRef>,
        owner_type: Option<&str>,
        token_type: Option<&str>,
        id: Option<&str>,
        payload: Option<Payload>,
    ) -> Result<()> {
        let mut criteria = TokenCriteria::new();
        if let Some(owner) = owner {
            criteria = criteria.with_owner(owner);
        }
        if let Some(owner_type) = owner_type {
            criteria = criteria.with_owner_type(owner_type);
        }
        if let Some(token_type) = token_type {
            criteria = criteria.with_type(token_type);
        }
        if let Some(payload) = payload {
            criteria = criteria.with_payload(payload);
        }
        let filter = DeleteFilter::new(criteria, id.map(str::to_string))?;
        self.delete_by(&filter).await
    }

    /// Revoke tokens owned by `owner`, optionally narrowed further.
    pub async fn delete_tokens_of<T: Tokenable>(
        &self,
        owner: &T,
        token_type: Option<&str>,
        id: Option<&str>,
        payload: Option<Payload>,
    ) -> Result<()> {
        self.delete_where(Some(owner.owner_ref()), None, token_type, id, payload)
            .await
    }

    /// Revoke every token issued up to now, in every driver.
    pub async fn force_delete_all(&self) -> Result<()> {
        let mut tx = self.store.pool().begin().await?;
        for driver in self.drivers.drivers() {
            driver.force_delete_all(&mut *tx).await?;
        }
        tx.commit().await?;

        tracing::warn!(drivers = ?self.drivers.names(), "all tokens revoked");
        Ok(())
    }

    // -- Owners --

    /// Materialize the entity that owns `record` through the host's resolver.
    pub async fn owner_of<R: OwnerResolver>(
        &self,
        record: &TokenRecord,
        resolver: &R,
    ) -> Result<R::Owner> {
        if !self.registry.is_registered(record.owner_type()) {
            return Err(TokenError::UnknownOwnerType(record.owner_type().to_string()));
        }

        resolver
            .resolve(record.owner_type(), record.owner_id())
            .await
            .map_err(TokenError::OwnerResolution)?
            .ok_or_else(|| TokenError::OwnerNotFound {
                owner_type: record.owner_type().to_string(),
                owner_id: record.owner_id().clone(),
            })
    }
}
