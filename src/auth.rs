use argon2::{self, Config as ArgonConfig};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AuthError};
use crate::models::User;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id. Older tokens carried it as `id` or `userId`.
    #[serde(alias = "id", alias = "userId")]
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub seller: bool,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub iat: usize,
    pub exp: usize,
}

/// The authenticated caller. Every component reads the caller through `user_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    pub is_seller: bool,
    pub is_admin: bool,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Identity {
            user_id: claims.sub,
            email: claims.email,
            is_seller: claims.seller,
            is_admin: claims.admin,
        }
    }
}

#[derive(Clone)]
pub struct TokenService {
    secret: String,
    ttl: chrono::Duration,
}

impl TokenService {
    pub fn new(secret: impl Into<String>, ttl_hours: i64) -> Self {
        TokenService {
            secret: secret.into(),
            ttl: chrono::Duration::hours(ttl_hours),
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, AppError> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: user.id.clone(),
            email: Some(user.email.clone()),
            seller: user.is_seller,
            admin: user.is_admin,
            iat: now.timestamp() as usize,
            exp: (now + self.ttl).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.secret.as_ref()))
            .map_err(|e| AppError::Internal(format!("Failed to encode token: {}", e)))
    }

    /// Checks a raw `Authorization` header value.
    pub fn verify(&self, header: Option<&str>) -> Result<Identity, AuthError> {
        let header = header.map(str::trim).filter(|h| !h.is_empty()).ok_or(AuthError::NoCredential)?;
        let rest = header.strip_prefix("Bearer").ok_or(AuthError::InvalidCredential)?;
        if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
            return Err(AuthError::InvalidCredential);
        }
        let token = rest.trim();
        if token.is_empty() {
            return Err(AuthError::NoCredential);
        }

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_ref()),
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| {
            log::debug!("Rejected token: {}", e);
            AuthError::InvalidCredential
        })?;

        if data.claims.sub.is_empty() {
            return Err(AuthError::InvalidCredential);
        }
        Ok(data.claims.into())
    }
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt: [u8; 16] = rand::thread_rng().gen();
    let config = ArgonConfig::default();
    argon2::hash_encoded(password.as_bytes(), &salt, &config)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    argon2::verify_encoded(hash, password.as_bytes()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user() -> User {
        User {
            id: "user-1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            phone: "555-0100".into(),
            password: String::new(),
            address: None,
            is_admin: false,
            is_seller: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sign(secret: &str, claims: &serde_json::Value) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_ref())).unwrap()
    }

    #[test]
    fn issued_token_round_trips_identity() {
        let tokens = TokenService::new("secret", 1);
        let token = tokens.issue(&user()).unwrap();
        let identity = tokens.verify(Some(&format!("Bearer {}", token))).unwrap();
        assert_eq!(identity.user_id, "user-1");
        assert_eq!(identity.email.as_deref(), Some("ada@example.com"));
        assert!(identity.is_seller);
        assert!(!identity.is_admin);
    }

    #[test]
    fn missing_header_is_no_credential() {
        let tokens = TokenService::new("secret", 1);
        assert_eq!(tokens.verify(None), Err(AuthError::NoCredential));
        assert_eq!(tokens.verify(Some("  ")), Err(AuthError::NoCredential));
        assert_eq!(tokens.verify(Some("Bearer ")), Err(AuthError::NoCredential));
        assert_eq!(tokens.verify(Some("Bearer")), Err(AuthError::NoCredential));
        assert_eq!(tokens.verify(Some(" Bearer \t ")), Err(AuthError::NoCredential));
    }

    #[test]
    fn scheme_must_be_separated_from_token() {
        let tokens = TokenService::new("secret", 1);
        let token = tokens.issue(&user()).unwrap();
        assert_eq!(
            tokens.verify(Some(&format!("Bearer{}", token))),
            Err(AuthError::InvalidCredential)
        );
        assert_eq!(tokens.verify(Some("Bearerxyz")), Err(AuthError::InvalidCredential));
        assert!(tokens.verify(Some(&format!("Bearer   {}", token))).is_ok());
    }

    #[test]
    fn bad_tokens_are_invalid() {
        let tokens = TokenService::new("secret", 1);
        let other = TokenService::new("other", 1).issue(&user()).unwrap();
        assert_eq!(
            tokens.verify(Some(&format!("Bearer {}", other))),
            Err(AuthError::InvalidCredential)
        );
        assert_eq!(tokens.verify(Some("Bearer nope")), Err(AuthError::InvalidCredential));
        assert_eq!(tokens.verify(Some("Basic abc")), Err(AuthError::InvalidCredential));

        let expired = sign(
            "secret",
            &serde_json::json!({ "sub": "user-1", "exp": Utc::now().timestamp() - 3600 }),
        );
        assert_eq!(
            tokens.verify(Some(&format!("Bearer {}", expired))),
            Err(AuthError::InvalidCredential)
        );
    }

    #[test]
    fn legacy_subject_names_normalize() {
        let tokens = TokenService::new("secret", 1);
        let exp = Utc::now().timestamp() + 3600;
        for field in ["id", "userId"] {
            let token = sign("secret", &serde_json::json!({ field: "legacy-7", "exp": exp }));
            let identity = tokens.verify(Some(&format!("Bearer {}", token))).unwrap();
            assert_eq!(identity.user_id, "legacy-7");
            assert_eq!(identity.email, None);
        }
    }

    #[test]
    fn passwords_verify_against_their_hash() {
        let hash = hash_password("hunter22").unwrap();
        assert_ne!(hash, "hunter22");
        assert!(verify_password(&hash, "hunter22"));
        assert!(!verify_password(&hash, "hunter23"));
        assert!(!verify_password("not-a-hash", "hunter22"));
    }
}
