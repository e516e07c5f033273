//! Caller identity: role, user/session identity, and cart ownership.

use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// Role of the authenticated caller, as reported by the identity
/// collaborator. The storefront trusts this value; it performs no
/// authentication of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular shopper: may manage their cart and place orders.
    #[default]
    Customer,

    /// Warehouse picker: may advance orders through fulfillment.
    Picker,

    /// Administrator: full catalog, promo, and order lifecycle rights.
    Admin,
}

impl Role {
    /// Returns the role name as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Picker => "picker",
            Role::Admin => "admin",
        }
    }

    /// Returns true for roles that work the fulfillment queue.
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Picker | Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a role string is not one of the known roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleParseError(pub String);

impl std::fmt::Display for RoleParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown role: {}", self.0)
    }
}

impl std::error::Error for RoleParseError {}

impl std::str::FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "picker" => Ok(Role::Picker),
            "admin" => Ok(Role::Admin),
            other => Err(RoleParseError(other.to_string())),
        }
    }
}

/// Opaque identifier of an anonymous browsing session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps a session token string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the session token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Ownership key of a cart: a cart belongs to exactly one user or one
/// anonymous session, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CartOwner {
    /// Cart of an authenticated user.
    User(UserId),

    /// Cart of an anonymous session.
    Session(SessionId),
}

impl CartOwner {
    /// Returns the user id when the owner is an authenticated user.
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            CartOwner::User(id) => Some(*id),
            CartOwner::Session(_) => None,
        }
    }
}

impl std::fmt::Display for CartOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CartOwner::User(id) => write!(f, "user:{id}"),
            CartOwner::Session(id) => write!(f, "session:{id}"),
        }
    }
}

/// The identity attached to a request by the identity collaborator.
///
/// Anonymous callers carry only a session id; authenticated callers carry
/// a user id and a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Authenticated user id, when present.
    pub user: Option<UserId>,

    /// Anonymous session id, when present.
    pub session: Option<SessionId>,

    /// Caller role; `Customer` for anonymous sessions.
    pub role: Role,
}

impl Caller {
    /// Creates an authenticated caller.
    pub fn user(id: UserId, role: Role) -> Self {
        Self {
            user: Some(id),
            session: None,
            role,
        }
    }

    /// Creates an anonymous session caller.
    pub fn session(id: impl Into<SessionId>) -> Self {
        Self {
            user: None,
            session: Some(id.into()),
            role: Role::Customer,
        }
    }

    /// Returns the cart ownership key for this caller, preferring the
    /// user identity when both are present.
    pub fn cart_owner(&self) -> Option<CartOwner> {
        if let Some(user) = self.user {
            Some(CartOwner::User(user))
        } else {
            self.session.clone().map(CartOwner::Session)
        }
    }

    /// Returns true when the caller is an administrator.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Returns true when the caller may work the fulfillment queue.
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}
