//! Admin authentication.
//!
//! Admins sign in with a username and password and receive an HS256 JWT
//! that is valid for 24 hours. Passwords and post edit codes are stored as
//! argon2 PHC strings.
//!
//! Several secrets may be configured to allow rotation: tokens are always
//! signed with the first one and accepted when any of them verifies.

use std::sync::LazyLock;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How long an admin token stays valid.
pub const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Length of an admin signup code.
pub const SIGNUP_CODE_LEN: usize = 8;

/// Minimum admin password length.
pub const MIN_PASSWORD_LEN: usize = 8;

static USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]{3,50}$").expect("valid username regex"));

/// Auth errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("No token provided")]
    MissingToken,

    #[error("Token is invalid or has expired")]
    InvalidToken,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("At least one secret must be configured")]
    NoSecrets,

    #[error("{0}")]
    Validation(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Token signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// JWT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    /// Issued at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds.
    pub exp: i64,
}

/// Signing and verification keys derived from the configured secrets.
#[derive(Clone)]
pub struct JwtKeys {
    signing: EncodingKey,
    verifying: Vec<DecodingKey>,
    validation: Validation,
}

impl JwtKeys {
    pub fn new(secrets: &[String]) -> Result<Self, AuthError> {
        let first = secrets.first().ok_or(AuthError::NoSecrets)?;

        Ok(Self {
            signing: EncodingKey::from_secret(first.as_bytes()),
            verifying: secrets
                .iter()
                .map(|s| DecodingKey::from_secret(s.as_bytes()))
                .collect(),
            validation: Validation::new(Algorithm::HS256),
        })
    }

    /// Issue a token for `username`.
    pub fn sign(&self, username: &str) -> Result<String, AuthError> {
        let iat = chrono::Utc::now().timestamp();
        let claims = Claims {
            username: username.to_string(),
            iat,
            exp: iat + TOKEN_TTL_SECS,
        };

        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.signing,
        )?)
    }

    /// Verify a token against every configured secret.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verifying
            .iter()
            .find_map(|key| jsonwebtoken::decode::<Claims>(token, key, &self.validation).ok())
            .map(|data| data.claims)
            .ok_or(AuthError::InvalidToken)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// Hash a password or edit code into a PHC string.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// Check a password against a stored PHC string. Malformed hashes never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Validate admin signup input.
pub fn validate_signup(username: &str, password: &str, code: &str) -> Result<(), AuthError> {
    if !USERNAME.is_match(username) {
        return Err(AuthError::Validation(
            "username must be 3 to 50 letters, digits or underscores".to_string(),
        ));
    }

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if code.chars().count() != SIGNUP_CODE_LEN {
        return Err(AuthError::Validation(format!(
            "signup code must be exactly {SIGNUP_CODE_LEN} characters"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(secrets: &[&str]) -> JwtKeys {
        let secrets: Vec<String> = secrets.iter().map(|s| s.to_string()).collect();
        JwtKeys::new(&secrets).unwrap()
    }

    #[test]
    fn test_sign_and_verify() {
        let keys = keys(&["first-secret"]);
        let token = keys.sign("marlowe").unwrap();

        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.username, "marlowe");
        assert_eq!(claims.exp - claims.iat, TOKEN_TTL_SECS);
    }

    #[test]
    fn test_any_secret_verifies() {
        let old = keys(&["old-secret"]);
        let rotated = keys(&["new-secret", "old-secret"]);

        let token = old.sign("marlowe").unwrap();
        assert_eq!(rotated.verify(&token).unwrap().username, "marlowe");

        // New tokens use the first secret only.
        let token = rotated.sign("marlowe").unwrap();
        assert!(matches!(old.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_rejects_tampered_and_expired() {
        let keys = keys(&["secret"]);
        assert!(matches!(keys.verify("not.a.jwt"), Err(AuthError::InvalidToken)));

        let now = chrono::Utc::now().timestamp();
        let expired = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &Claims {
                username: "marlowe".to_string(),
                iat: now - 2 * TOKEN_TTL_SECS,
                exp: now - TOKEN_TTL_SECS,
            },
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(matches!(keys.verify(&expired), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_no_secrets() {
        assert!(matches!(JwtKeys::new(&[]), Err(AuthError::NoSecrets)));
    }

    #[test]
    fn test_bearer_token() {
        assert_eq!(bearer_token(Some("Bearer abc.def")).unwrap(), "abc.def");
        assert!(matches!(bearer_token(None), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token(Some("Basic abc")), Err(AuthError::MissingToken)));
        assert!(matches!(bearer_token(Some("Bearer ")), Err(AuthError::MissingToken)));
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "plaintext"));
        assert!(!verify_password("correct horse", ""));
    }

    #[test]
    fn test_validate_signup() {
        assert!(validate_signup("marlowe_1", "longenough", "deadbeef").is_ok());
        assert!(validate_signup("ab", "longenough", "deadbeef").is_err());
        assert!(validate_signup(&"a".repeat(51), "longenough", "deadbeef").is_err());
        assert!(validate_signup("bad name", "longenough", "deadbeef").is_err());
        assert!(validate_signup("marlowe", "short", "deadbeef").is_err());
        assert!(validate_signup("marlowe", "longenough", "dead").is_err());
    }
}
