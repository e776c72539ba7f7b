//! Lookup and revocation filters, plus the fluent query handle.

use crate::errors::{Result, TokenError};
use crate::models::blacklist::NewBlacklistEntry;
use crate::models::owner::Tokenable;
use crate::models::token::{canonical_json, stored_payload, OwnerRef, Payload, TokenRecord};
use crate::service::TokenService;

/// Optional constraints applied to a lookup or revocation. Every set field
/// must match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenCriteria {
    owner: Option<OwnerRef>,
    owner_type: Option<String>,
    token_type: Option<String>,
    payload: Option<Payload>,
}

impl TokenCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_owner_type(mut self, owner_type: impl Into<String>) -> Self {
        self.owner_type = Some(owner_type.into());
        self
    }

    pub fn with_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn owner(&self) -> Option<&OwnerRef> {
        self.owner.as_ref()
    }

    /// The owner type constrained by either the owner or the owner-type filter.
    pub fn owner_type(&self) -> Option<&str> {
        self.owner
            .as_ref()
            .map(|owner| owner.owner_type.as_str())
            .or(self.owner_type.as_deref())
    }

    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    /// An empty payload constrains nothing.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref().filter(|payload| !payload.is_empty())
    }

    /// True when no owner, owner type or token type is constrained.
    pub fn is_unscoped(&self) -> bool {
        self.owner.is_none() && self.owner_type.is_none() && self.token_type.is_none()
    }

    /// An owner filter and an owner-type filter must agree.
    pub fn validate(&self) -> Result<()> {
        if let (Some(owner), Some(filter_type)) = (&self.owner, &self.owner_type) {
            if &owner.owner_type != filter_type {
                return Err(TokenError::ConflictingOwnerFilter {
                    owner_type: owner.owner_type.clone(),
                    filter_type: filter_type.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn matches(&self, record: &TokenRecord) -> bool {
        if let Some(owner) = &self.owner {
            if owner.owner_type != record.owner_type()
                || !owner.owner_id.same_key(record.owner_id())
            {
                return false;
            }
        }
        if let Some(owner_type) = &self.owner_type {
            if owner_type != record.owner_type() {
                return false;
            }
        }
        if let Some(token_type) = &self.token_type {
            if token_type != record.token_type() {
                return false;
            }
        }
        match self.payload() {
            Some(payload) => canonical_json(payload) == canonical_json(record.payload()),
            None => true,
        }
    }
}

/// A validated revocation request.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteFilter {
    criteria: TokenCriteria,
    id: Option<String>,
}

impl DeleteFilter {
    /// At least one of owner, owner type, token type or id is required. A
    /// payload alone is refused.
    pub fn new(criteria: TokenCriteria, id: Option<String>) -> Result<Self> {
        criteria.validate()?;
        let id = id.filter(|id| !id.is_empty());
        if criteria.is_unscoped() && id.is_none() {
            return Err(if criteria.payload().is_some() {
                TokenError::PayloadOnlyDeleteFilter
            } else {
                TokenError::MissingDeleteFilter
            });
        }
        Ok(Self { criteria, id })
    }

    pub fn criteria(&self) -> &TokenCriteria {
        &self.criteria
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// The revocation rule equivalent to this filter.
    pub fn to_blacklist_entry(&self) -> NewBlacklistEntry {
        let criteria = &self.criteria;
        NewBlacklistEntry {
            uuid: self.id.clone(),
            model_class: criteria.owner_type().map(str::to_string),
            model_id: criteria.owner.as_ref().map(|owner| owner.owner_id.clone()),
            token_type: criteria.token_type.clone(),
            data: criteria.payload().and_then(stored_payload),
        }
    }
}

/// Fluent lookup bound to a service. Filters accumulate until `find`.
pub struct TokenQuery<'a> {
    service: &'a TokenService,
    criteria: TokenCriteria,
}

impl<'a> TokenQuery<'a> {
    pub(crate) fn new(service: &'a TokenService) -> Self {
        Self {
            service,
            criteria: TokenCriteria::new(),
        }
    }

    pub fn where_owner(mut self, owner: OwnerRef) -> Self {
        self.criteria = self.criteria.with_owner(owner);
        self
    }

    pub fn where_owner_of<T: Tokenable>(self, owner: &T) -> Self {
        self.where_owner(owner.owner_ref())
    }

    pub fn where_owner_type(mut self, owner_type: impl Into<String>) -> Self {
        self.criteria = self.criteria.with_owner_type(owner_type);
        self
    }

    pub fn where_type(mut self, token_type: impl Into<String>) -> Self {
        self.criteria = self.criteria.with_type(token_type);
        self
    }

    pub fn where_payload(mut self, payload: Payload) -> Self {
        self.criteria = self.criteria.with_payload(payload);
        self
    }

    pub fn criteria(&self) -> &TokenCriteria {
        &self.criteria
    }

    pub async fn find(self, secret: &str) -> Result<Option<TokenRecord>> {
        self.service.find_matching(secret, &self.criteria).await
    }

    pub async fn find_or_fail(self, secret: &str) -> Result<TokenRecord> {
        self.find(secret)
            .await?
            .ok_or_else(|| TokenError::TokenNotFound(secret.to_string()))
    }
}
