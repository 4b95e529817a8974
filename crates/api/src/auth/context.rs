//! Session context for authenticated callers
//!
//! Built once when a connection or request is authenticated and passed
//! explicitly to every handler. Never mutated afterwards.

use time::OffsetDateTime;
use uuid::Uuid;

use super::jwt::{Claims, Role};
use super::AuthError;

/// Identity and tenant scope of an authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// Unique id of this connection (or request)
    pub session_id: Uuid,
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub role: Role,
    /// `jti` of the token the session was admitted with
    pub token_id: String,
    pub expires_at: OffsetDateTime,
}

impl SessionContext {
    /// Build a context from validated claims
    pub fn from_claims(claims: Claims) -> Result<Self, AuthError> {
        let expires_at =
            OffsetDateTime::from_unix_timestamp(claims.exp).map_err(|_| AuthError::InvalidToken)?;

        Ok(Self {
            session_id: Uuid::new_v4(),
            company_id: claims.company_id,
            user_id: claims.sub,
            name: claims.name,
            role: claims.role,
            token_id: claims.jti,
            expires_at,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_channel(&self) -> bool {
        self.role == Role::Channel
    }

    /// Whether a resource owned by `company_id` is visible to this session
    pub fn can_access_company(&self, company_id: Uuid) -> bool {
        self.company_id == company_id
    }

    /// Time left before the admitting token expires (zero if already past)
    pub fn time_to_expiry(&self) -> std::time::Duration {
        let remaining = self.expires_at - OffsetDateTime::now_utc();
        remaining.try_into().unwrap_or_default()
    }
}
