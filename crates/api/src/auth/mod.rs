//! Authentication for Parley
//!
//! Bearer credentials are issued by the platform's auth service; this module
//! only verifies them and turns them into a [`SessionContext`].

pub mod context;
pub mod jwt;
pub mod middleware;
pub mod revocation;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use time::OffsetDateTime;

pub use context::SessionContext;
pub use jwt::{Claims, JwtError, JwtManager, Role, TokenType};
pub use middleware::{bearer_token, require_auth};
pub use revocation::RevocationList;

/// Authentication failure. Terminal for the connection or request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization required")]
    MissingAuthorization,
    #[error("Invalid authorization header format")]
    InvalidAuthorizationFormat,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Token has been revoked")]
    Revoked,
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        tracing::debug!(error = %err, "Token validation failed");
        AuthError::InvalidToken
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let code = match self {
            AuthError::MissingAuthorization => "MISSING_AUTHORIZATION",
            AuthError::InvalidAuthorizationFormat => "INVALID_AUTHORIZATION",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::Revoked => "TOKEN_REVOKED",
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (StatusCode::UNAUTHORIZED, body).into_response()
    }
}

/// Verifies bearer tokens and checks them against the revocation list
#[derive(Clone)]
pub struct Authenticator {
    jwt: JwtManager,
    revocations: Arc<RevocationList>,
}

impl Authenticator {
    pub fn new(jwt: JwtManager, revocations: Arc<RevocationList>) -> Self {
        Self { jwt, revocations }
    }

    pub fn jwt(&self) -> &JwtManager {
        &self.jwt
    }

    pub fn revocations(&self) -> &RevocationList {
        &self.revocations
    }

    /// Validate an access token and build the caller's session context
    pub async fn authenticate(&self, token: &str) -> Result<SessionContext, AuthError> {
        let claims = self.jwt.validate_access_token(token)?;
        if claims.exp <= OffsetDateTime::now_utc().unix_timestamp() {
            return Err(AuthError::InvalidToken);
        }

        if self.revocations.is_revoked(&claims).await {
            tracing::warn!(user_id = %claims.sub, jti = %claims.jti, "Rejected revoked token");
            return Err(AuthError::Revoked);
        }

        SessionContext::from_claims(claims)
    }
}
