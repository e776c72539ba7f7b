use thiserror::Error;

use crate::codec::CodecError;
use crate::models::token::OwnerId;

pub type Result<T> = std::result::Result<T, TokenError>;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token {0} not found")]
    TokenNotFound(String),

    #[error("the driver '{0}' is not supported")]
    UnsupportedDriver(String),

    #[error("bulk delete requires at least one filter")]
    MissingDeleteFilter,

    #[error("a payload filter must be combined with at least one other filter")]
    PayloadOnlyDeleteFilter,

    #[error("owner filter '{owner_type}' conflicts with owner type filter '{filter_type}'")]
    ConflictingOwnerFilter {
        owner_type: String,
        filter_type: String,
    },

    #[error("owner type '{0}' is not registered for tokens")]
    UnregisteredOwnerType(String),

    #[error("token type {token_type} is not supported in {owner_type}")]
    UnsupportedTokenType {
        token_type: String,
        owner_type: String,
    },

    #[error("owner type '{0}' cannot be resolved")]
    UnknownOwnerType(String),

    #[error("owner {owner_type}#{owner_id} not found")]
    OwnerNotFound {
        owner_type: String,
        owner_id: OwnerId,
    },

    #[error("owner resolution failed: {0}")]
    OwnerResolution(#[source] anyhow::Error),

    #[error("expiry {expires_at} precedes creation time {created_at}")]
    ExpiryBeforeCreation {
        created_at: chrono::DateTime<chrono::Utc>,
        expires_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TokenError {
    /// Validation errors are raised before any storage is touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TokenError::UnsupportedDriver(_)
                | TokenError::MissingDeleteFilter
                | TokenError::PayloadOnlyDeleteFilter
                | TokenError::ConflictingOwnerFilter { .. }
                | TokenError::UnregisteredOwnerType(_)
                | TokenError::UnsupportedTokenType { .. }
                | TokenError::ExpiryBeforeCreation { .. }
                | TokenError::InvalidTableName(_)
        )
    }
}
