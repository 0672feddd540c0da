use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT payload issued after a successful sign-in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,   // user ID, decimal
    pub email: String, // normalized email at issue time
    pub iat: i64,      // issued at (unix timestamp)
    pub exp: i64,      // expires at (unix timestamp)
    pub iss: String,   // issuer
    pub jti: Uuid,     // token ID
}

/// What a successfully verified token proves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject_id: i64,
    pub email: String,
}

impl TryFrom<Claims> for VerifiedToken {
    type Error = std::num::ParseIntError;

    fn try_from(c: Claims) -> Result<Self, Self::Error> {
        Ok(Self {
            subject_id: c.sub.parse()?,
            email: c.email,
        })
    }
}
