//! Shared types used across the storefront crates.
//!
//! Provides UUID-backed identifier newtypes for every entity and the
//! caller identity model (role + cart ownership key) that the external
//! identity collaborator supplies with each request.

pub mod actor;
pub mod ids;

pub use actor::{Caller, CartOwner, Role, RoleParseError, SessionId};
pub use ids::{CartId, OrderId, ProductId, PromoCodeId, UserId};
