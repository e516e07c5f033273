//! HTTP route handlers.

pub mod cart;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;
pub mod promos;

use common::Caller;

use crate::error::ApiError;

/// Guards an admin-only endpoint.
pub(crate) fn require_admin(caller: &Caller) -> Result<(), ApiError> {
    if caller.is_admin() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Administrator role required".to_string()))
    }
}

/// Guards a picker/admin endpoint.
pub(crate) fn require_staff(caller: &Caller) -> Result<(), ApiError> {
    if caller.is_staff() {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Staff role required".to_string()))
    }
}
