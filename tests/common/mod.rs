#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::Value;

use entity_tokens::clock::{Clock, ManualClock};
use entity_tokens::codec::TokenCodec;
use entity_tokens::config::TokenConfig;
use entity_tokens::drivers::{DriverManager, StatelessDriver, TokenDriver};
use entity_tokens::store::{SqlStore, Tables};
use entity_tokens::{OwnerId, OwnerRegistry, Payload, TokenService, Tokenable};

pub const TEST_KEY: &str = "8f3c1a9e5b7d2f4061a8c3e9d7b5f1a2c4e6081b3d5f7a9c2e4b6d8f0a1c3e5b";

pub struct Company {
    pub id: i64,
}

impl Tokenable for Company {
    const OWNER_TYPE: &'static str = "Company";

    fn allowed_token_types() -> &'static [&'static str] {
        &["INVITE_TOKEN", "ACCESS_TOKEN"]
    }

    fn owner_id(&self) -> OwnerId {
        OwnerId::Int(self.id)
    }
}

pub struct Project {
    pub id: i64,
}

impl Tokenable for Project {
    const OWNER_TYPE: &'static str = "Project";

    fn allowed_token_types() -> &'static [&'static str] {
        &["ACCESS_TOKEN"]
    }

    fn owner_id(&self) -> OwnerId {
        OwnerId::Int(self.id)
    }
}

pub struct Harness {
    pub service: TokenService,
    pub store: SqlStore,
    pub clock: Arc<ManualClock>,
    pub company: Company,
    pub project1: Project,
    pub project2: Project,
}

impl Harness {
    pub async fn new(drivers: &[&str], default_driver: &str, use_all_drivers: bool) -> Self {
        let store = SqlStore::in_memory(Tables::default()).await.unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));

        let config = TokenConfig {
            drivers: drivers.iter().map(|d| d.to_string()).collect(),
            default_driver: default_driver.to_string(),
            use_all_drivers,
            ..TokenConfig::default()
        };
        let manager = DriverManager::from_config(
            &config,
            &store,
            &TokenCodec::new(TEST_KEY).unwrap(),
            clock.clone() as Arc<dyn Clock>,
        )
        .unwrap();

        Self::assemble(manager, store, clock)
    }

    /// The stateless driver as default, followed by `extra`, all consulted on lookup.
    pub async fn stateless_and(extra: Arc<dyn TokenDriver>) -> Self {
        let store = SqlStore::in_memory(Tables::default()).await.unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let stateless: Arc<dyn TokenDriver> = Arc::new(StatelessDriver::new(
            store.clone(),
            TokenCodec::new(TEST_KEY).unwrap(),
            clock.clone() as Arc<dyn Clock>,
        ));
        let manager = DriverManager::new(vec![stateless, extra], "stateless", true).unwrap();

        Self::assemble(manager, store, clock)
    }

    fn assemble(manager: DriverManager, store: SqlStore, clock: Arc<ManualClock>) -> Self {
        let mut registry = OwnerRegistry::new();
        registry.register::<Company>().register::<Project>();

        Self {
            service: TokenService::from_parts(manager, registry, store.clone()),
            store,
            clock,
            company: Company { id: 1 },
            project1: Project { id: 1 },
            project2: Project { id: 2 },
        }
    }

    pub async fn stateless() -> Self {
        Self::new(&["stateless"], "stateless", false).await
    }

    pub async fn database() -> Self {
        Self::new(&["database"], "database", false).await
    }

    /// Both drivers, stateless first, every driver consulted on lookup.
    pub async fn all_drivers() -> Self {
        Self::new(&["stateless", "database"], "stateless", true).await
    }

    pub async fn blacklist_count(&self) -> usize {
        self.store.list_blacklist_entries().await.unwrap().len()
    }

    pub async fn deleted_row_count(&self) -> usize {
        self.store
            .list_token_rows()
            .await
            .unwrap()
            .iter()
            .filter(|row| row.deleted_at.is_some())
            .count()
    }
}

pub fn payload(value: Value) -> Payload {
    value.as_object().cloned().unwrap()
}
