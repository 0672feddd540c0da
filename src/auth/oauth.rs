//! Federated sign-in. A provider adapter (whatever runs the Google/Facebook
//! handshake) posts the verified identity here; we find or provision the user
//! and hand back our own token.

use axum::http::HeaderMap;
use serde::Deserialize;

pub const FEDERATION_SECRET_HEADER: &str = "x-federation-secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    Google,
    Facebook,
}

/// Identity asserted by a provider adapter after its own handshake succeeded.
#[derive(Debug, Clone, Deserialize)]
pub struct FederatedIdentity {
    pub provider: OAuthProvider,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// True when the request carries the configured federation secret.
pub fn has_federation_secret(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(FEDERATION_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|given| constant_time_eq(given.as_bytes(), expected.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn provider_names_are_lowercase() {
        let id: FederatedIdentity =
            serde_json::from_str(r#"{"provider":"google","email":"a@b.com"}"#).unwrap();
        assert_eq!(id.provider, OAuthProvider::Google);
        assert!(id.name.is_none());
        assert!(serde_json::from_str::<FederatedIdentity>(r#"{"provider":"myspace"}"#).is_err());
    }

    #[test]
    fn federation_secret_must_match_exactly() {
        let mut headers = HeaderMap::new();
        assert!(!has_federation_secret(&headers, "s3cret"));
        headers.insert(FEDERATION_SECRET_HEADER, HeaderValue::from_static("s3cre"));
        assert!(!has_federation_secret(&headers, "s3cret"));
        headers.insert(FEDERATION_SECRET_HEADER, HeaderValue::from_static("s3cret"));
        assert!(has_federation_secret(&headers, "s3cret"));
    }
}
