use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::{debug, warn};

use super::{errors::AuthError, jwt::JwtKeys};

/// Authenticated caller, identified by the user id inside a valid bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    JwtKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                debug!("missing Authorization header");
                AuthError::Unauthenticated
            })?;

        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .ok_or_else(|| {
                debug!("invalid auth scheme");
                AuthError::Unauthenticated
            })?;

        let keys = JwtKeys::from_ref(state);
        match keys.verify(token) {
            Ok(verified) => Ok(AuthUser(verified.subject_id)),
            Err(reason) => {
                // Unverified claims only feed the log line.
                let claimed = JwtKeys::decode_unverified(token);
                warn!(
                    %reason,
                    claimed_sub = claimed.as_ref().map(|c| c.sub.as_str()),
                    claimed_iss = claimed.as_ref().map(|c| c.iss.as_str()),
                    "rejected bearer token"
                );
                Err(AuthError::Unauthenticated)
            }
        }
    }
}
