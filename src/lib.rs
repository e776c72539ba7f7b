//! Entity tokens: short-lived and long-lived tokens bound to owning
//! entities, issued and revoked through pluggable drivers.
//!
//! Two built-in drivers: `stateless` (encrypted self-contained secrets,
//! revoked through a blacklist) and `database` (random secrets stored as
//! rows, revoked by soft delete). [`service::TokenService`] routes between them.

pub mod clock;
pub mod codec;
pub mod config;
pub mod drivers;
pub mod errors;
pub mod jobs;
pub mod models;
pub mod query;
pub mod service;
pub mod store;

pub use errors::{Result, TokenError};
pub use models::owner::{OwnerRegistry, OwnerResolver, Tokenable};
pub use models::token::{Expiry, OwnerId, OwnerRef, Payload, TokenRecord};
pub use query::{DeleteFilter, TokenCriteria, TokenQuery};
pub use service::{TokenOptions, TokenService};
