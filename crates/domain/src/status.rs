//! Role-gated order status transitions.
//!
//! All transition authority lives in this one table rather than scattered
//! per-route checks. Callers consult it exactly once, before any mutation.

use common::Role;
use thiserror::Error;

use crate::order::OrderStatus;

/// A transition the caller's role does not permit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{role} may not move an order from {from} to {to}")]
pub struct ForbiddenTransition {
    pub role: Role,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// Returns true if `role` may move an order from `from` to `to`.
///
/// Pickers walk the forward lifecycle only: `pending → processing` and
/// `processing → completed`. Admins may set any state, including backward
/// moves to correct mistakes. Customers have no transition rights.
pub fn transition_allowed(role: Role, from: OrderStatus, to: OrderStatus) -> bool {
    match role {
        Role::Admin => true,
        Role::Picker => matches!(
            (from, to),
            (OrderStatus::Pending, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::Completed)
        ),
        Role::Customer => false,
    }
}

/// Checks a transition, failing with [`ForbiddenTransition`] when the role
/// lacks the edge.
pub fn authorize_transition(
    role: Role,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<(), ForbiddenTransition> {
    if transition_allowed(role, from, to) {
        Ok(())
    } else {
        Err(ForbiddenTransition { role, from, to })
    }
}
