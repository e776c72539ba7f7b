pub mod database;
pub mod stateless;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqliteConnection;

use crate::clock::Clock;
use crate::codec::TokenCodec;
use crate::config::TokenConfig;
use crate::errors::{Result, TokenError};
use crate::models::token::{Expiry, OwnerRef, Payload, TokenRecord};
use crate::query::{DeleteFilter, TokenCriteria};
use crate::store::SqlStore;

pub use database::DatabaseDriver;
pub use stateless::StatelessDriver;

pub const STATELESS: &str = "stateless";
pub const DATABASE: &str = "database";

/// A token storage strategy.
/// Implementations: StatelessDriver (encrypted self-contained secrets),
/// DatabaseDriver (random secrets persisted in the tokens table).
#[async_trait]
pub trait TokenDriver: Send + Sync {
    fn name(&self) -> &str;

    /// The live token for `secret`, if it satisfies every filter.
    /// Unknown, expired and revoked secrets all yield `None`.
    async fn find(&self, secret: &str, criteria: &TokenCriteria) -> Result<Option<TokenRecord>>;

    async fn create(
        &self,
        owner: &OwnerRef,
        token_type: &str,
        expires: Option<Expiry>,
        payload: Payload,
    ) -> Result<TokenRecord>;

    /// Revoke every matching token. Runs inside the caller's transaction.
    async fn delete_by(&self, conn: &mut SqliteConnection, filter: &DeleteFilter) -> Result<()>;

    /// Revoke every token issued so far. Runs inside the caller's transaction.
    async fn force_delete_all(&self, conn: &mut SqliteConnection) -> Result<()>;
}

/// The enabled drivers, default first.
pub struct DriverManager {
    drivers: Vec<Arc<dyn TokenDriver>>,
    use_all_drivers: bool,
}

impl DriverManager {
    pub fn new(
        drivers: Vec<Arc<dyn TokenDriver>>,
        default_driver: &str,
        use_all_drivers: bool,
    ) -> Result<Self> {
        let mut ordered: Vec<Arc<dyn TokenDriver>> = Vec::with_capacity(drivers.len());
        for driver in drivers {
            if !ordered.iter().any(|d| d.name() == driver.name()) {
                ordered.push(driver);
            }
        }

        let position = ordered
            .iter()
            .position(|d| d.name() == default_driver)
            .ok_or_else(|| TokenError::UnsupportedDriver(default_driver.to_string()))?;
        let default = ordered.remove(position);
        ordered.insert(0, default);

        Ok(Self {
            drivers: ordered,
            use_all_drivers,
        })
    }

    /// Build the built-in drivers named in the configuration.
    pub fn from_config(
        config: &TokenConfig,
        store: &SqlStore,
        codec: &TokenCodec,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let mut drivers: Vec<Arc<dyn TokenDriver>> = Vec::with_capacity(config.drivers.len());
        for name in &config.drivers {
            let driver: Arc<dyn TokenDriver> = match name.as_str() {
                STATELESS => Arc::new(StatelessDriver::new(
                    store.clone(),
                    codec.clone(),
                    clock.clone(),
                )),
                DATABASE => Arc::new(DatabaseDriver::new(store.clone(), clock.clone())),
                other => return Err(TokenError::UnsupportedDriver(other.to_string())),
            };
            drivers.push(driver);
        }
        Self::new(drivers, &config.default_driver, config.use_all_drivers)
    }

    pub fn drivers(&self) -> &[Arc<dyn TokenDriver>] {
        &self.drivers
    }

    /// Drivers consulted on lookup: all of them, or only the default.
    pub fn lookup_order(&self) -> &[Arc<dyn TokenDriver>] {
        if self.use_all_drivers {
            &self.drivers
        } else {
            &self.drivers[..1]
        }
    }

    pub fn default_driver(&self) -> &Arc<dyn TokenDriver> {
        &self.drivers[0]
    }

    pub fn driver(&self, name: &str) -> Result<&Arc<dyn TokenDriver>> {
        self.drivers
            .iter()
            .find(|d| d.name() == name)
            .ok_or_else(|| TokenError::UnsupportedDriver(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }
}
