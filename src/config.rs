use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::codec::TokenCodec;
use crate::drivers::{DATABASE, STATELESS};
use crate::errors::Result;
use crate::models::owner::OwnerRegistry;
use crate::store::sqlite::{Tables, DEFAULT_BLACKLIST_TABLE, DEFAULT_TOKENS_TABLE};

/// Library-level settings. Usually read from a YAML file:
///
/// ```yaml
/// drivers: [stateless, database]
/// default_driver: stateless
/// use_all_drivers: true
/// owners:
///   App\Models\Company: [INVITE_TOKEN, ACCESS_TOKEN]
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Enabled drivers.
    pub drivers: Vec<String>,
    pub default_driver: String,
    /// Consult every enabled driver on lookup, default first.
    pub use_all_drivers: bool,
    pub blacklist_table: String,
    pub tokens_table: String,
    /// Owner type → accepted token types.
    pub owners: BTreeMap<String, Vec<String>>,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            drivers: vec![STATELESS.to_string()],
            default_driver: STATELESS.to_string(),
            use_all_drivers: false,
            blacklist_table: DEFAULT_BLACKLIST_TABLE.to_string(),
            tokens_table: DEFAULT_TOKENS_TABLE.to_string(),
            owners: BTreeMap::new(),
        }
    }
}

impl TokenConfig {
    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(raw).context("invalid token configuration")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml(&raw)
    }

    pub fn tables(&self) -> Result<Tables> {
        Tables::new(&self.tokens_table, &self.blacklist_table)
    }

    pub fn owner_registry(&self) -> OwnerRegistry {
        self.owners
            .iter()
            .map(|(owner_type, token_types)| (owner_type.as_str(), token_types.clone()))
            .collect()
    }

    pub fn uses_driver(&self, name: &str) -> bool {
        self.drivers.iter().any(|d| d == name)
    }
}

/// Process-level settings for `tokenctl`.
#[derive(Debug)]
pub struct Config {
    pub database_url: String,
    /// 64 hex chars, or `base64:` + 32 bytes. Required by the stateless driver.
    pub token_key: Option<String>,
    pub tokens: TokenConfig,
}

impl Config {
    /// A codec for the configured key, or a disabled one when no key is set.
    pub fn codec(&self) -> anyhow::Result<TokenCodec> {
        match self.token_key.as_deref() {
            Some(key) => TokenCodec::new(key).context("TOKENS_KEY is invalid"),
            None => Ok(TokenCodec::disabled()),
        }
    }
}

pub fn load(config_path: Option<&Path>) -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    load_from(config_path, |name| std::env::var(name).ok())
}

/// `load` with an injectable environment.
pub fn load_from(
    config_path: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Config> {
    let file = config_path
        .map(Path::to_path_buf)
        .or_else(|| env("TOKENS_CONFIG").map(PathBuf::from));
    let mut tokens = match file {
        Some(path) => TokenConfig::from_file(&path)?,
        None => TokenConfig::default(),
    };

    if let Some(drivers) = env("TOKENS_DRIVERS") {
        tokens.drivers = drivers
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(default_driver) = env("TOKENS_DEFAULT_DRIVER") {
        tokens.default_driver = default_driver.trim().to_string();
    }
    if let Some(use_all) = env("TOKENS_USE_ALL_DRIVERS") {
        tokens.use_all_drivers = matches!(use_all.trim(), "1" | "true" | "yes" | "on");
    }

    let token_key = env("TOKENS_KEY").filter(|k| !k.trim().is_empty());
    if token_key.is_none() && tokens.uses_driver(STATELESS) {
        let env_mode = env("TOKENS_ENV")
            .or_else(|| env("RUST_ENV"))
            .unwrap_or_default();
        if env_mode == "production" {
            anyhow::bail!(
                "TOKENS_KEY is not set. The stateless driver needs a 64-char hex key in production."
            );
        }
        tracing::warn!("TOKENS_KEY is not set; stateless tokens can be neither issued nor read");
    }

    if !tokens.uses_driver(DATABASE) && !tokens.uses_driver(STATELESS) {
        tracing::warn!(drivers = ?tokens.drivers, "no built-in driver enabled");
    }

    Ok(Config {
        database_url: env("TOKENS_DATABASE_URL")
            .or_else(|| env("DATABASE_URL"))
            .unwrap_or_else(|| "sqlite://tokens.db".into()),
        token_key,
        tokens,
    })
}
