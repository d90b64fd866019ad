//! session-auth — password hashing and session tokens for registered users.
//!
//! Purpose
//! - Hash passwords with Argon2id (random per-password salt) and verify them.
//! - Issue and verify HS256 session tokens carrying the user id as `sub`.
//!
//! API
//! - `SessionAuth::new(secret, ttl)` implements `domain::SessionAuthority`.
//!
//! Notes
//! - Token validation checks signature, issuer and expiry; any failure maps
//!   to `CoreError::Unauthorized` at the port boundary.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use domain::{CoreError, SessionAuthority, UserId};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{error, trace};

const ISSUER: &str = "affiliate-links";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing or malformed token")]
    Malformed,
    #[error("signature invalid")]
    SignatureInvalid,
    #[error("token expired")]
    Expired,
    #[error("issuer mismatch")]
    BadIssuer,
    #[error("token creation failed")]
    TokenCreation,
    #[error("password hashing failed")]
    Hashing,
}

impl From<AuthError> for CoreError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::TokenCreation | AuthError::Hashing => {
                CoreError::Repository(e.to_string())
            }
            _ => CoreError::Unauthorized,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    iat: i64,
    exp: i64,
}

struct Keys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl Keys {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

pub struct SessionAuth {
    keys: Keys,
    ttl: Duration,
}

impl SessionAuth {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            keys: Keys::new(secret),
            ttl,
        }
    }

    fn sign(&self, user_id: UserId, now: DateTime<Utc>) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user_id.to_string(),
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding).map_err(|e| {
            error!(err = ?e, "session token encoding failed");
            AuthError::TokenCreation
        })
    }

    fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.leeway = 0;
        let data = decode::<Claims>(token, &self.keys.decoding, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => AuthError::BadIssuer,
                _ => AuthError::Malformed,
            }
        })?;
        data.claims.sub.parse().map_err(|_| AuthError::Malformed)
    }
}

impl SessionAuthority for SessionAuth {
    fn hash_password(&self, plain: &str) -> Result<String, CoreError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plain.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| {
                error!(err = %e, "password hashing failed");
                AuthError::Hashing.into()
            })
    }

    fn verify_password(&self, plain: &str, hash: &str) -> Result<bool, CoreError> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(err = %e, "stored password hash is unreadable");
            CoreError::Repository("stored password hash is unreadable".into())
        })?;
        Ok(Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok())
    }

    fn issue_token(&self, user_id: UserId) -> Result<String, CoreError> {
        Ok(self.sign(user_id, Utc::now())?)
    }

    fn verify_token(&self, token: &str) -> Result<UserId, CoreError> {
        self.verify(token).map_err(|e| {
            trace!(err = %e, "session token rejected");
            e.into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn auth() -> SessionAuth {
        SessionAuth::new(SECRET, Duration::minutes(30))
    }

    #[test]
    fn token_roundtrip() {
        let a = auth();
        let token = a.issue_token(42).unwrap();
        assert_eq!(a.verify_token(&token).unwrap(), 42);
    }

    #[test]
    fn expired_token_is_rejected() {
        let a = auth();
        let token = a.sign(7, Utc::now() - Duration::hours(2)).unwrap();
        assert_eq!(a.verify(&token).unwrap_err(), AuthError::Expired);
        assert_eq!(a.verify_token(&token).unwrap_err(), CoreError::Unauthorized);
    }

    #[test]
    fn foreign_secret_and_garbage_are_rejected() {
        let other = SessionAuth::new(b"another-secret-of-enough-length", Duration::minutes(30));
        let token = other.issue_token(1).unwrap();
        assert_eq!(auth().verify(&token).unwrap_err(), AuthError::SignatureInvalid);
        assert_eq!(auth().verify("not.a.jwt").unwrap_err(), AuthError::Malformed);
        assert_eq!(auth().verify_token("").unwrap_err(), CoreError::Unauthorized);
    }

    #[test]
    fn password_hash_verifies_and_is_salted() {
        let a = auth();
        let h1 = a.hash_password("secret1").unwrap();
        let h2 = a.hash_password("secret1").unwrap();
        assert_ne!(h1, h2);
        assert!(h1.starts_with("$argon2id$"));
        assert!(a.verify_password("secret1", &h1).unwrap());
        assert!(!a.verify_password("secret2", &h1).unwrap());
        assert!(a.verify_password("secret1", "plain-text").is_err());
    }
}
