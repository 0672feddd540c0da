use std::{collections::HashSet, time::Duration};

use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use anyhow::Context;
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, VerifiedToken};
use crate::{config::JwtConfig, state::AppState};

/// Why a token was rejected. Every variant means "not authenticated".
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InvalidToken {
    #[error("token expired")]
    Expired,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token issuer mismatch")]
    WrongIssuer,
    #[error("malformed token")]
    Malformed,
}

impl From<jsonwebtoken::errors::Error> for InvalidToken {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => InvalidToken::Expired,
            ErrorKind::InvalidSignature => InvalidToken::BadSignature,
            ErrorKind::InvalidIssuer => InvalidToken::WrongIssuer,
            _ => InvalidToken::Malformed,
        }
    }
}

/// Holds JWT signing and verification keys with config data.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.keys.clone()
    }
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            ttl: Duration::from_secs((cfg.ttl_minutes.max(0) as u64).saturating_mul(60)),
        }
    }

    pub fn issue(&self, user_id: i64, email: &str) -> anyhow::Result<String> {
        self.issue_at(user_id, email, OffsetDateTime::now_utc())
    }

    fn issue_at(&self, user_id: i64, email: &str, now: OffsetDateTime) -> anyhow::Result<String> {
        let exp = i64::try_from(self.ttl.as_secs())
            .ok()
            .and_then(|secs| now.checked_add(TimeDuration::seconds(secs)))
            .context("token expiry out of range")?;
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            iat: now.unix_timestamp(),
            exp: exp.unix_timestamp(),
            iss: self.issuer.clone(),
            jti: Uuid::new_v4(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        debug!(user_id, "jwt signed");
        Ok(token)
    }

    /// Checks signature, expiry and issuer. Fails closed.
    pub fn verify(&self, token: &str) -> Result<VerifiedToken, InvalidToken> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.validate_aud = false;
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        let verified =
            VerifiedToken::try_from(data.claims).map_err(|_| InvalidToken::Malformed)?;
        debug!(user_id = verified.subject_id, "jwt verified");
        Ok(verified)
    }

    /// Reads claims WITHOUT checking the signature or expiry.
    /// Only for diagnostics; never authorize anything with the result.
    pub fn decode_unverified(token: &str) -> Option<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .map(|d| d.claims)
    }
}
