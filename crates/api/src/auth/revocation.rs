//! Revoked tokens and users
//!
//! Consulted on every authentication so a revoked credential cannot be used
//! to reconnect after its live sessions were force-disconnected.

use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::jwt::Claims;

/// Revocations are keyed by the owning company, so one tenant's admin can
/// never invalidate another tenant's credentials.
#[derive(Default)]
pub struct RevocationList {
    /// (company id, jti) -> token expiry (unix seconds), pruned once expired
    tokens: Arc<RwLock<HashMap<(Uuid, String), i64>>>,
    /// (company id, user id) -> revocation time; tokens issued at or before it are rejected
    users: Arc<RwLock<HashMap<(Uuid, Uuid), i64>>>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke a single token until it would have expired anyway
    pub async fn revoke_token(&self, company_id: Uuid, jti: &str, expires_at: i64) {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut tokens = self.tokens.write().await;
        tokens.retain(|_, exp| *exp >= now);
        tokens.insert((company_id, jti.to_string()), expires_at);

        tracing::info!(company_id = %company_id, jti = %jti, "Token revoked");
    }

    /// Revoke every token issued to a user up to now
    pub async fn revoke_user(&self, company_id: Uuid, user_id: Uuid) {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.users.write().await.insert((company_id, user_id), now);

        tracing::info!(company_id = %company_id, user_id = %user_id, "All tokens for user revoked");
    }

    pub async fn is_revoked(&self, claims: &Claims) -> bool {
        let token_key = (claims.company_id, claims.jti.clone());
        if self.tokens.read().await.contains_key(&token_key) {
            return true;
        }

        self.users
            .read()
            .await
            .get(&(claims.company_id, claims.sub))
            .is_some_and(|revoked_at| claims.iat <= *revoked_at)
    }
}
