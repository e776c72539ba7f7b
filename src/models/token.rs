use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{Sqlite, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Type, TypeInfo, ValueRef};

use crate::clock::truncate_to_second;
use crate::errors::{Result, TokenError};

/// Arbitrary caller data attached to a token.
pub type Payload = serde_json::Map<String, Value>;

/// Primary key of the owning entity. Hosts use either integer or string keys.
///
/// `model_id` columns have INTEGER affinity, so SQLite stores `"42"` as the
/// integer 42. Conversions from strings apply the same rule: a canonical
/// integer string becomes [`OwnerId::Int`], and owner filters compare keys
/// with [`OwnerId::same_key`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OwnerId {
    Int(i64),
    Str(String),
}

impl OwnerId {
    /// Integers stay integers, anything else is kept verbatim.
    pub fn parse(raw: &str) -> Self {
        raw.parse::<i64>()
            .map(OwnerId::Int)
            .unwrap_or_else(|_| OwnerId::Str(raw.to_string()))
    }

    /// `Str("42")` becomes `Int(42)`. Non-canonical forms such as `"042"` stay strings.
    pub fn normalized(self) -> Self {
        match self {
            OwnerId::Str(raw) => match raw.parse::<i64>() {
                Ok(id) if id.to_string() == raw => OwnerId::Int(id),
                _ => OwnerId::Str(raw),
            },
            id => id,
        }
    }

    /// Equal once both sides are normalized.
    pub fn same_key(&self, other: &OwnerId) -> bool {
        match (self, other) {
            (OwnerId::Int(a), OwnerId::Int(b)) => a == b,
            (OwnerId::Str(a), OwnerId::Str(b)) => a == b,
            _ => self.clone().normalized() == other.clone().normalized(),
        }
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerId::Int(id) => write!(f, "{}", id),
            OwnerId::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for OwnerId {
    fn from(id: i64) -> Self {
        OwnerId::Int(id)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        OwnerId::Str(id.to_string()).normalized()
    }
}

impl From<String> for OwnerId {
    fn from(id: String) -> Self {
        OwnerId::Str(id).normalized()
    }
}

// `model_id` columns hold whichever storage class the key came in as.

impl Type<Sqlite> for OwnerId {
    fn type_info() -> SqliteTypeInfo {
        <i64 as Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <i64 as Type<Sqlite>>::compatible(ty) || <String as Type<Sqlite>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Sqlite> for OwnerId {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as sqlx::Database>::ArgumentBuffer<'q>,
    ) -> std::result::Result<IsNull, BoxDynError> {
        match self {
            OwnerId::Int(id) => <i64 as Encode<'q, Sqlite>>::encode_by_ref(id, buf),
            OwnerId::Str(id) => <String as Encode<'q, Sqlite>>::encode_by_ref(id, buf),
        }
    }
}

impl<'r> Decode<'r, Sqlite> for OwnerId {
    fn decode(value: SqliteValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        let is_integer = value.type_info().name() == "INTEGER";
        if is_integer {
            Ok(OwnerId::Int(<i64 as Decode<'r, Sqlite>>::decode(value)?))
        } else {
            Ok(OwnerId::Str(<String as Decode<'r, Sqlite>>::decode(value)?))
        }
    }
}

/// A reference to a concrete owning entity: its type name plus primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub owner_type: String,
    pub owner_id: OwnerId,
}

impl OwnerRef {
    pub fn new(owner_type: impl Into<String>, owner_id: impl Into<OwnerId>) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id: owner_id.into(),
        }
    }
}

/// When a new token stops being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    At(DateTime<Utc>),
    In(Duration),
}

impl Expiry {
    /// Resolve against the (already truncated) creation time.
    pub fn resolve(self, created_at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let expires_at = match self {
            Expiry::At(at) => truncate_to_second(at),
            Expiry::In(after) => truncate_to_second(created_at + after),
        };
        if expires_at < created_at {
            return Err(TokenError::ExpiryBeforeCreation {
                created_at,
                expires_at,
            });
        }
        Ok(expires_at)
    }
}

impl From<Duration> for Expiry {
    fn from(after: Duration) -> Self {
        Expiry::In(after)
    }
}

impl From<DateTime<Utc>> for Expiry {
    fn from(at: DateTime<Utc>) -> Self {
        Expiry::At(at)
    }
}

/// Serialize a payload with keys sorted at every depth, so equal mappings
/// always produce identical text regardless of insertion order.
pub fn canonical_json(payload: &Payload) -> String {
    let sorted: BTreeMap<&String, Value> = payload
        .iter()
        .map(|(k, v)| (k, canonicalize(v)))
        .collect();
    serde_json::to_string(&sorted).unwrap_or_else(|_| "{}".to_string())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> =
                map.iter().map(|(k, v)| (k, canonicalize(v))).collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonical form for storage; an empty payload is stored as NULL.
pub fn stored_payload(payload: &Payload) -> Option<String> {
    if payload.is_empty() {
        None
    } else {
        Some(canonical_json(payload))
    }
}

/// An issued token as seen by callers. Never mutated after construction;
/// revocation only affects later lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenRecord {
    driver: String,
    id: String,
    owner_type: String,
    owner_id: OwnerId,
    token_type: String,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
    payload: Payload,
    #[serde(skip_serializing)]
    secret: String,
}

impl TokenRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        driver: &str,
        id: String,
        owner_type: String,
        owner_id: OwnerId,
        token_type: String,
        created_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
        payload: Payload,
        secret: String,
    ) -> Self {
        Self {
            driver: driver.to_string(),
            id,
            owner_type,
            owner_id,
            token_type,
            created_at,
            expires_at,
            payload,
            secret,
        }
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner_type(&self) -> &str {
        &self.owner_type
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn owner(&self) -> OwnerRef {
        OwnerRef::new(self.owner_type.clone(), self.owner_id.clone())
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The opaque string handed to the client.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Still live at `now`. Expiry is exclusive for every driver: a token
    /// whose `expires_at` equals `now` is already dead, stateless or stored.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires_at| now < expires_at)
    }
}
