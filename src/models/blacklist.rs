use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::token::OwnerId;

/// A persisted revocation rule. `None` fields match any value.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct BlacklistEntry {
    pub id: i64,
    pub uuid: Option<String>,
    pub model_class: Option<String>,
    pub model_id: Option<OwnerId>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub token_type: Option<String>,
    pub data: Option<String>,
    pub blacklisted_at: DateTime<Utc>,
}

impl BlacklistEntry {
    pub fn is_wildcard(&self) -> bool {
        self.uuid.is_none()
            && self.model_class.is_none()
            && self.model_id.is_none()
            && self.token_type.is_none()
            && self.data.is_none()
    }
}

/// Values for a new revocation rule, appended by `delete_by`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewBlacklistEntry {
    pub uuid: Option<String>,
    pub model_class: Option<String>,
    pub model_id: Option<OwnerId>,
    pub token_type: Option<String>,
    /// Canonical payload JSON.
    pub data: Option<String>,
}

impl NewBlacklistEntry {
    /// Matches every token issued up to the moment it is recorded.
    pub fn wildcard() -> Self {
        Self::default()
    }
}
