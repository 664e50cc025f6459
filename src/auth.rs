//! Bearer token issuance/verification and password hashing.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

use crate::{app_error::AppError, config::AuthConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i32,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 keys derived from the configured secret.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::hours(config.token_ttl_hours),
        }
    }

    pub fn issue(&self, user_id: i32, email: &str) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Other(anyhow::anyhow!("Failed to sign token: {e}")))
    }

    /// Rejections carry the reason shown to the client.
    pub fn verify(&self, token: &str) -> Result<Claims, AppError> {
        decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "Token expired",
                    ErrorKind::InvalidToken
                    | ErrorKind::Base64(_)
                    | ErrorKind::Json(_)
                    | ErrorKind::Utf8(_) => "Invalid token format",
                    _ => "Invalid token",
                };
                AppError::InvalidToken(reason.into())
            })
    }
}

/// Hash a password using Argon2id.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Other(anyhow::anyhow!("Failed to hash password: {e}")))
}

/// Verify a password against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn keys() -> JwtKeys {
        JwtKeys::new(&AuthConfig {
            jwt_secret: SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
            token_ttl_hours: 24,
        })
    }

    #[test]
    fn issued_token_verifies_to_the_same_user() {
        let keys = keys();
        let token = keys.issue(42, "buyer@example.com").unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.email, "buyer@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn garbage_token_is_rejected_as_invalid_format() {
        let err = keys().verify("not-a-jwt").unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(reason) if reason == "Invalid token format"));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let keys = keys();
        let past = Utc::now() - Duration::hours(3);
        let claims = Claims {
            sub: 1,
            email: "old@example.com".into(),
            iat: past.timestamp(),
            exp: (past + Duration::hours(1)).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).unwrap();

        let err = keys.verify(&token).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(reason) if reason == "Token expired"));
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let other = JwtKeys::new(&AuthConfig {
            jwt_secret: SecretString::from("ffffffffffffffffffffffffffffffff".to_string()),
            token_ttl_hours: 1,
        });
        let token = other.issue(1, "x@example.com").unwrap();
        let err = keys().verify(&token).unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(reason) if reason == "Invalid token"));
    }

    #[test]
    fn password_hash_is_salted_and_verifies() {
        let first = hash_password("hunter22").unwrap();
        let second = hash_password("hunter22").unwrap();
        assert_ne!(first, second);
        assert!(first.starts_with("$argon2id$"));
        assert!(verify_password("hunter22", &first));
        assert!(!verify_password("hunter23", &first));
        assert!(!verify_password("hunter22", "not-a-phc-string"));
    }
}
