//! Bearer-token middleware for REST routes

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};

use super::{AuthError, Authenticator};

/// Extract the bearer token from an `Authorization` header, if present
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<String>, AuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| AuthError::InvalidAuthorizationFormat)?;

    value
        .strip_prefix("Bearer ")
        .map(|token| Some(token.trim().to_string()))
        .ok_or(AuthError::InvalidAuthorizationFormat)
}

/// Require a valid bearer token; inserts the [`super::SessionContext`] as a request extension
pub async fn require_auth(
    State(auth): State<Authenticator>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = bearer_token(request.headers())?.ok_or(AuthError::MissingAuthorization)?;
    let ctx = auth.authenticate(&token).await?;

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}
