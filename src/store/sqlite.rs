use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use crate::errors::{Result, TokenError};
use crate::models::blacklist::{BlacklistEntry, NewBlacklistEntry};
use crate::models::token::{canonical_json, OwnerId, Payload, TokenRecord};
use crate::query::{DeleteFilter, TokenCriteria};

pub const DEFAULT_TOKENS_TABLE: &str = "tokens";
pub const DEFAULT_BLACKLIST_TABLE: &str = "token_blacklists";

/// Matches only the entry written by a force-delete: every field is a wildcard.
const WILDCARD_ENTRY: &str =
    "uuid IS NULL AND model_class IS NULL AND model_id IS NULL AND type IS NULL AND data IS NULL";

/// Configured table names. Interpolated into SQL, so restricted to plain
/// identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    tokens: String,
    blacklist: String,
}

impl Tables {
    pub fn new(tokens: &str, blacklist: &str) -> Result<Self> {
        Ok(Self {
            tokens: validate_identifier(tokens)?,
            blacklist: validate_identifier(blacklist)?,
        })
    }

    pub fn tokens(&self) -> &str {
        &self.tokens
    }

    pub fn blacklist(&self) -> &str {
        &self.blacklist
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            tokens: DEFAULT_TOKENS_TABLE.to_string(),
            blacklist: DEFAULT_BLACKLIST_TABLE.to_string(),
        }
    }
}

fn validate_identifier(name: &str) -> Result<String> {
    let name = name.trim();
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(name.to_string())
    } else {
        Err(TokenError::InvalidTableName(name.to_string()))
    }
}

/// A row of the tokens table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TokenRow {
    pub id: i64,
    pub token: String,
    pub model_class: String,
    pub model_id: OwnerId,
    #[sqlx(rename = "type")]
    pub token_type: String,
    pub data: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl TokenRow {
    pub fn into_record(self, driver: &str) -> Result<TokenRecord> {
        let payload = match self.data.as_deref() {
            Some(data) => serde_json::from_str::<Payload>(data)?,
            None => Payload::new(),
        };
        Ok(TokenRecord::new(
            driver,
            self.id.to_string(),
            self.model_class,
            self.model_id,
            self.token_type,
            self.created_at,
            self.expires_at,
            payload,
            self.token,
        ))
    }
}

pub struct NewToken<'a> {
    pub token: &'a str,
    pub model_class: &'a str,
    pub model_id: &'a OwnerId,
    pub token_type: &'a str,
    pub data: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// SQLite-backed persistence for both token tables.
#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: SqlitePool,
    tables: Tables,
}

impl SqlStore {
    pub async fn connect(database_url: &str, tables: Tables) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self { pool, tables })
    }

    /// A private in-memory database. A single connection that never
    /// recycles, since every SQLite memory connection is its own database.
    pub async fn in_memory(tables: Tables) -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;
        let store = Self { pool, tables };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Create both tables if they do not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        let tokens = self.tables.tokens();
        let blacklist = self.tables.blacklist();
        let statements = [
            format!(
                r#"CREATE TABLE IF NOT EXISTS {tokens} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    token TEXT NOT NULL UNIQUE,
                    model_class TEXT NOT NULL,
                    model_id INTEGER NOT NULL,
                    type TEXT NOT NULL,
                    data TEXT NULL,
                    expires_at TIMESTAMP NULL,
                    created_at TIMESTAMP NOT NULL,
                    deleted_at TIMESTAMP NULL
                )"#
            ),
            format!("CREATE INDEX IF NOT EXISTS {tokens}_model_index ON {tokens} (model_class, model_id)"),
            format!(
                r#"CREATE TABLE IF NOT EXISTS {blacklist} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NULL,
                    model_class TEXT NULL,
                    model_id INTEGER NULL,
                    type TEXT NULL,
                    data TEXT NULL,
                    blacklisted_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                )"#
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {blacklist}_blacklisted_at_index ON {blacklist} (blacklisted_at)"
            ),
        ];

        for statement in &statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    // -- Token Operations --

    pub async fn insert_token(&self, token: &NewToken<'_>) -> Result<i64> {
        let sql = format!(
            "INSERT INTO {} (token, model_class, model_id, type, data, expires_at, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.tables.tokens()
        );
        let result = sqlx::query(&sql)
            .bind(token.token)
            .bind(token.model_class)
            .bind(token.model_id)
            .bind(token.token_type)
            .bind(&token.data)
            .bind(token.expires_at)
            .bind(token.created_at)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// First live row with this secret that satisfies `criteria`.
    pub async fn find_token(
        &self,
        secret: &str,
        criteria: &TokenCriteria,
        now: DateTime<Utc>,
    ) -> Result<Option<TokenRow>> {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT id, token, model_class, model_id, type, data, expires_at, created_at, deleted_at FROM {} WHERE token = ",
            self.tables.tokens()
        ));
        qb.push_bind(secret.to_string());
        push_live(&mut qb, now);
        push_criteria(&mut qb, criteria);
        qb.push(" LIMIT 1");

        let row = qb
            .build_query_as::<TokenRow>()
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Soft-delete every live row matching the filter. Returns rows marked.
    pub async fn soft_delete_tokens(
        &self,
        conn: &mut SqliteConnection,
        filter: &DeleteFilter,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let row_id = match filter.id() {
            Some(id) => match id.parse::<i64>() {
                Ok(row_id) => Some(row_id),
                // Not a row id of this table, so nothing here can match.
                Err(_) => return Ok(0),
            },
            None => None,
        };

        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "UPDATE {} SET deleted_at = ",
            self.tables.tokens()
        ));
        qb.push_bind(now);
        qb.push(" WHERE 1 = 1");
        push_live(&mut qb, now);
        push_criteria(&mut qb, filter.criteria());
        if let Some(row_id) = row_id {
            qb.push(" AND id = ").push_bind(row_id);
        }

        let result = qb.build().execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    pub async fn soft_delete_all_tokens(
        &self,
        conn: &mut SqliteConnection,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let sql = format!(
            "UPDATE {} SET deleted_at = ? WHERE deleted_at IS NULL",
            self.tables.tokens()
        );
        let result = sqlx::query(&sql).bind(now).execute(&mut *conn).await?;
        Ok(result.rows_affected())
    }

    /// Every row, including soft-deleted and expired ones, oldest first.
    pub async fn list_token_rows(&self) -> Result<Vec<TokenRow>> {
        let sql = format!(
            "SELECT id, token, model_class, model_id, type, data, expires_at, created_at, deleted_at FROM {} ORDER BY id ASC",
            self.tables.tokens()
        );
        let rows = sqlx::query_as::<_, TokenRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    // -- Blacklist Operations --

    pub async fn insert_blacklist_entry(
        &self,
        conn: &mut SqliteConnection,
        entry: &NewBlacklistEntry,
        blacklisted_at: DateTime<Utc>,
    ) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (uuid, model_class, model_id, type, data, blacklisted_at) VALUES (?, ?, ?, ?, ?, ?)",
            self.tables.blacklist()
        );
        sqlx::query(&sql)
            .bind(&entry.uuid)
            .bind(&entry.model_class)
            .bind(&entry.model_id)
            .bind(&entry.token_type)
            .bind(&entry.data)
            .bind(blacklisted_at)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Whether any revocation rule recorded at or after the token's creation
    /// matches it. A single existence query over the whole blacklist.
    pub async fn is_blacklisted(&self, record: &TokenRecord) -> Result<bool> {
        let sql = format!(
            r#"SELECT EXISTS(
                SELECT 1 FROM {}
                WHERE blacklisted_at >= ?
                  AND (model_class = ? OR model_class IS NULL)
                  AND ((model_class = ? AND model_id = ?) OR model_id IS NULL)
                  AND (type = ? OR type IS NULL)
                  AND (uuid = ? OR uuid IS NULL)
                  AND (data = ? OR data IS NULL)
            )"#,
            self.tables.blacklist()
        );
        let blacklisted = sqlx::query_scalar::<_, bool>(&sql)
            .bind(record.created_at())
            .bind(record.owner_type())
            .bind(record.owner_type())
            .bind(record.owner_id())
            .bind(record.token_type())
            .bind(record.id())
            .bind(canonical_json(record.payload()))
            .fetch_one(&self.pool)
            .await?;
        Ok(blacklisted)
    }

    pub async fn list_blacklist_entries(&self) -> Result<Vec<BlacklistEntry>> {
        let sql = format!(
            "SELECT id, uuid, model_class, model_id, type, data, blacklisted_at FROM {} ORDER BY id ASC",
            self.tables.blacklist()
        );
        let rows = sqlx::query_as::<_, BlacklistEntry>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Drop entries made redundant by a later (or simultaneous) all-wildcard
    /// entry, keeping the newest wildcard. Lookup results are unchanged.
    pub async fn compact_blacklist(&self) -> Result<u64> {
        let blacklist = self.tables.blacklist();
        let sql = format!(
            r#"DELETE FROM {blacklist}
               WHERE id <> (
                   SELECT id FROM {blacklist} WHERE {WILDCARD_ENTRY}
                   ORDER BY blacklisted_at DESC, id DESC LIMIT 1
               )
               AND blacklisted_at <= (
                   SELECT MAX(blacklisted_at) FROM {blacklist} WHERE {WILDCARD_ENTRY}
               )"#
        );
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn push_live(qb: &mut QueryBuilder<'_, Sqlite>, now: DateTime<Utc>) {
    qb.push(" AND (expires_at IS NULL OR expires_at > ")
        .push_bind(now)
        .push(") AND deleted_at IS NULL");
}

fn push_criteria(qb: &mut QueryBuilder<'_, Sqlite>, criteria: &TokenCriteria) {
    if let Some(owner) = criteria.owner() {
        qb.push(" AND model_class = ")
            .push_bind(owner.owner_type.clone())
            .push(" AND model_id = ")
            .push_bind(owner.owner_id.clone());
    } else if let Some(owner_type) = criteria.owner_type() {
        qb.push(" AND model_class = ").push_bind(owner_type.to_string());
    }
    if let Some(token_type) = criteria.token_type() {
        qb.push(" AND type = ").push_bind(token_type.to_string());
    }
    if let Some(payload) = criteria.payload() {
        qb.push(" AND data = ").push_bind(canonical_json(payload));
    }
}
