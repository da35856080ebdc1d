//! Session-token verification for the WebSocket handshake.
//!
//! Token format: base64url(claims-json).base64url(hmac_sha256(claims-json)).

use base64::Engine;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use time::{Duration, OffsetDateTime};

type HmacSha256 = Hmac<Sha256>;

const B64: base64::engine::general_purpose::GeneralPurpose =
    base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Tokens are honored for a day from issuance.
const TOKEN_TTL: Duration = Duration::days(1);

/// The authenticated caller, as carried inside the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub email: String,
}

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: i64,
    email: String,
    iat: i64,
    exp: i64,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("AUTH_MISSING")]
    Missing,
    #[error("AUTH_INVALID")]
    Invalid,
}

/// Verifies (and, for the signin surface and tests, mints) session tokens.
/// Held on the app state; one per process.
#[derive(Clone)]
pub struct Authenticator {
    key: Vec<u8>,
}

impl Authenticator {
    /// Build from the configured shared secret. A hex string is decoded to
    /// its bytes, anything else is used raw; with no secret configured a
    /// random key is generated (tokens then die with the process).
    pub fn from_secret(secret: Option<&str>) -> Self {
        let key = match secret {
            Some(s) => hex::decode(s).unwrap_or_else(|_| s.as_bytes().to_vec()),
            None => {
                tracing::warn!("JWT_SECRET unset, generating a volatile key");
                let mut kb = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut kb);
                kb.to_vec()
            }
        };
        Self { key }
    }

    pub fn issue(&self, user_id: i64, email: &str) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + TOKEN_TTL).unix_timestamp(),
        };
        let payload = serde_json::to_vec(&claims)?;
        let sig = self.sign(&payload);
        Ok(format!("{}.{}", B64.encode(&payload), B64.encode(sig)))
    }

    /// Verify a handshake token. `None` (no `token` query parameter) is
    /// `AUTH_MISSING`; any malformed, tampered, or expired token is
    /// `AUTH_INVALID`.
    pub fn verify(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = token.ok_or(AuthError::Missing)?;
        let mut parts = token.split('.');
        let (p1, p2) = match (parts.next(), parts.next(), parts.next()) {
            (Some(p1), Some(p2), None) => (p1, p2),
            _ => return Err(AuthError::Invalid),
        };
        let payload = B64.decode(p1).map_err(|_| AuthError::Invalid)?;
        let sig = B64.decode(p2).map_err(|_| AuthError::Invalid)?;
        if sig != self.sign(&payload) {
            return Err(AuthError::Invalid);
        }
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| AuthError::Invalid)?;
        if claims.exp < OffsetDateTime::now_utc().unix_timestamp() {
            return Err(AuthError::Invalid);
        }
        Ok(Identity { user_id: claims.sub, email: claims.email })
    }

    fn sign(&self, data: &[u8]) -> [u8; 32] {
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("hmac key");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> Authenticator {
        Authenticator::from_secret(Some("sekrit"))
    }

    #[test]
    fn roundtrip_recovers_identity() {
        let a = auth();
        let token = a.issue(42, "red@pallet.town").unwrap();
        let id = a.verify(Some(&token)).unwrap();
        assert_eq!(id, Identity { user_id: 42, email: "red@pallet.town".into() });
    }

    #[test]
    fn missing_token_is_auth_missing() {
        assert_eq!(auth().verify(None), Err(AuthError::Missing));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let a = auth();
        let token = a.issue(1, "a@b.c").unwrap();
        let mut forged = token.clone();
        forged.pop();
        forged.push(if token.ends_with('A') { 'B' } else { 'A' });
        assert_eq!(a.verify(Some(&forged)), Err(AuthError::Invalid));
    }

    #[test]
    fn foreign_key_is_rejected() {
        let token = auth().issue(1, "a@b.c").unwrap();
        let other = Authenticator::from_secret(Some("other"));
        assert_eq!(other.verify(Some(&token)), Err(AuthError::Invalid));
    }

    #[test]
    fn garbage_is_rejected() {
        for junk in ["", "x", "a.b", "a.b.c", "!!.!!"] {
            assert_eq!(auth().verify(Some(junk)), Err(AuthError::Invalid));
        }
    }

    #[test]
    fn expired_token_is_rejected() {
        let a = auth();
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: 9,
            email: "late@b.c".into(),
            iat: now - 100_000,
            exp: now - 10,
        };
        let payload = serde_json::to_vec(&claims).unwrap();
        let sig = a.sign(&payload);
        let token = format!("{}.{}", B64.encode(&payload), B64.encode(sig));
        assert_eq!(a.verify(Some(&token)), Err(AuthError::Invalid));
    }
}
