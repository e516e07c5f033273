//! Caller identity extraction.
//!
//! The identity collaborator in front of this service authenticates the
//! caller and forwards the result as trusted headers; this extractor only
//! parses them. Authenticated callers carry `x-user-id` (UUID) and
//! `x-user-role`; anonymous shoppers carry `x-session-id`.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use common::{Caller, Role, SessionId, UserId};
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// The caller identity parsed from request headers.
///
/// Rejects requests carrying neither a user nor a session identity.
#[derive(Debug, Clone)]
pub struct Identity(pub Caller);

impl Identity {
    fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let header_str = |name: &str| -> Result<Option<&str>, ApiError> {
            headers
                .get(name)
                .map(|value| {
                    value
                        .to_str()
                        .map_err(|_| ApiError::BadRequest(format!("Malformed {name} header")))
                })
                .transpose()
        };

        let user = header_str(USER_ID_HEADER)?
            .map(|raw| {
                Uuid::parse_str(raw)
                    .map(UserId::from_uuid)
                    .map_err(|e| ApiError::BadRequest(format!("Invalid {USER_ID_HEADER}: {e}")))
            })
            .transpose()?;
        let role = header_str(USER_ROLE_HEADER)?
            .map(|raw| {
                raw.parse::<Role>()
                    .map_err(|e| ApiError::BadRequest(e.to_string()))
            })
            .transpose()?
            .unwrap_or_default();
        let session = header_str(SESSION_ID_HEADER)?.map(SessionId::from);

        if user.is_none() && session.is_none() {
            return Err(ApiError::Unauthenticated(
                "Request carries no user or session identity".to_string(),
            ));
        }
        Ok(Identity(Caller {
            user,
            session,
            role,
        }))
    }

    /// Parses an identity when the headers carry a usable one.
    ///
    /// For endpoints that are public but behave differently for staff;
    /// malformed or absent identity headers read as anonymous.
    pub fn try_from_headers(headers: &HeaderMap) -> Option<Self> {
        Self::from_headers(headers).ok()
    }

    /// Unwraps the identity into the shared caller type.
    pub fn into_caller(self) -> Caller {
        self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(
                axum::http::HeaderName::try_from(*name).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn parses_authenticated_caller() {
        let user = Uuid::new_v4();
        let identity = Identity::from_headers(&headers(&[
            (USER_ID_HEADER, &user.to_string()),
            (USER_ROLE_HEADER, "picker"),
        ]))
        .unwrap();

        assert_eq!(identity.0.user, Some(UserId::from_uuid(user)));
        assert_eq!(identity.0.role, Role::Picker);
    }

    #[test]
    fn role_defaults_to_customer() {
        let user = Uuid::new_v4();
        let identity =
            Identity::from_headers(&headers(&[(USER_ID_HEADER, &user.to_string())])).unwrap();
        assert_eq!(identity.0.role, Role::Customer);
    }

    #[test]
    fn parses_anonymous_session() {
        let identity =
            Identity::from_headers(&headers(&[(SESSION_ID_HEADER, "sess-1")])).unwrap();
        assert_eq!(identity.0.user, None);
        assert_eq!(identity.0.session, Some(SessionId::new("sess-1")));
    }

    #[test]
    fn rejects_missing_identity() {
        let err = Identity::from_headers(&headers(&[])).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(_)));
    }

    #[test]
    fn rejects_unknown_role() {
        let user = Uuid::new_v4();
        let err = Identity::from_headers(&headers(&[
            (USER_ID_HEADER, &user.to_string()),
            (USER_ROLE_HEADER, "manager"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn rejects_malformed_user_id() {
        let err =
            Identity::from_headers(&headers(&[(USER_ID_HEADER, "not-a-uuid")])).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }
}
