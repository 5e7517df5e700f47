use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;

/// Role resolved by the upstream identity lookup. There is no implied
/// ordering between roles; every operation names the roles it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Rider,
    Admin,
}

impl Role {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "rider" => Some(Role::Rider),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Rider => "rider",
            Role::Admin => "admin",
        }
    }
}

/// Caller identity, always passed explicitly into core operations.
/// The HTTP layer materializes it from the identity headers injected by
/// the auth proxy in front of this service.
#[derive(Debug, Clone)]
pub struct Actor {
    pub email: String,
    pub role: Role,
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub struct RoleGate;

impl RoleGate {
    pub fn require(actor: &Actor, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&actor.role) {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "role {} may not perform this operation",
            actor.role.as_str()
        )))
    }
}

const EMAIL_HEADER: &str = "x-actor-email";
const ROLE_HEADER: &str = "x-actor-role";

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let email = parts
            .headers
            .get(EMAIL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::Unauthenticated(format!("missing {EMAIL_HEADER} header")))?;

        let raw_role = parts
            .headers
            .get(ROLE_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthenticated(format!("missing {ROLE_HEADER} header")))?;

        let role = Role::parse(raw_role).ok_or_else(|| {
            AppError::Unauthenticated(format!("unrecognized role {raw_role:?}"))
        })?;

        Ok(Actor {
            email: email.to_string(),
            role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Actor, Role, RoleGate};

    fn actor(role: Role) -> Actor {
        Actor {
            email: "someone@example.com".to_string(),
            role,
        }
    }

    #[test]
    fn allowed_role_passes_the_gate() {
        assert!(RoleGate::require(&actor(Role::Admin), &[Role::Admin]).is_ok());
        assert!(RoleGate::require(&actor(Role::Rider), &[Role::Rider, Role::Admin]).is_ok());
    }

    #[test]
    fn disallowed_role_is_rejected() {
        let err = RoleGate::require(&actor(Role::User), &[Role::Admin]).unwrap_err();
        assert!(err.to_string().contains("user"));
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!(Role::parse(" Admin "), Some(Role::Admin));
        assert_eq!(Role::parse("RIDER"), Some(Role::Rider));
        assert_eq!(Role::parse("merchant"), None);
    }
}
