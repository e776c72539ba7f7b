use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::errors::{Result, TokenError};
use crate::models::token::{OwnerId, OwnerRef};

/// Implemented by host entities that can own tokens.
pub trait Tokenable {
    /// Fully-qualified owner type name recorded on every token.
    const OWNER_TYPE: &'static str;

    /// Token types this owner type accepts when creating or querying.
    fn allowed_token_types() -> &'static [&'static str];

    fn owner_id(&self) -> OwnerId;

    fn owner_ref(&self) -> OwnerRef {
        OwnerRef::new(Self::OWNER_TYPE, self.owner_id())
    }
}

/// Host-supplied lookup from `(owner_type, owner_id)` to a live entity.
/// Only invoked when a caller asks to materialize a token's owner.
#[async_trait]
pub trait OwnerResolver: Send + Sync {
    type Owner: Send;

    async fn resolve(&self, owner_type: &str, owner_id: &OwnerId) -> anyhow::Result<Option<Self::Owner>>;
}

/// Capability table: owner type name → accepted token types.
/// Populated once at startup.
#[derive(Debug, Clone, Default)]
pub struct OwnerRegistry {
    owners: BTreeMap<String, BTreeSet<String>>,
}

impl OwnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Tokenable>(&mut self) -> &mut Self {
        self.register_type(T::OWNER_TYPE, T::allowed_token_types().iter().copied())
    }

    pub fn register_type<I, S>(&mut self, owner_type: &str, token_types: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.owners
            .entry(owner_type.to_string())
            .or_default()
            .extend(token_types.into_iter().map(Into::<String>::into));
        self
    }

    pub fn is_registered(&self, owner_type: &str) -> bool {
        self.owners.contains_key(owner_type)
    }

    pub fn accepted_types(&self, owner_type: &str) -> Option<&BTreeSet<String>> {
        self.owners.get(owner_type)
    }

    pub fn ensure_registered(&self, owner_type: &str) -> Result<()> {
        if self.is_registered(owner_type) {
            Ok(())
        } else {
            Err(TokenError::UnregisteredOwnerType(owner_type.to_string()))
        }
    }

    /// The owner type must be registered and accept `token_type`.
    pub fn ensure_accepts(&self, owner_type: &str, token_type: &str) -> Result<()> {
        let accepted = self
            .accepted_types(owner_type)
            .ok_or_else(|| TokenError::UnregisteredOwnerType(owner_type.to_string()))?;
        if accepted.contains(token_type) {
            Ok(())
        } else {
            Err(TokenError::UnsupportedTokenType {
                token_type: token_type.to_string(),
                owner_type: owner_type.to_string(),
            })
        }
    }
}

impl<S: Into<String>> FromIterator<(S, Vec<String>)> for OwnerRegistry {
    fn from_iter<I: IntoIterator<Item = (S, Vec<String>)>>(iter: I) -> Self {
        let mut registry = OwnerRegistry::new();
        for (owner_type, token_types) in iter {
            let owner_type: String = owner_type.into();
            registry.register_type(&owner_type, token_types);
        }
        registry
    }
}
