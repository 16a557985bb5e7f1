use std::future::{ready, Ready};
use std::sync::Arc;

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::User;
use crate::store::Store;

pub const ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 15;
pub const REFRESH_TOKEN_EXPIRE_DAYS: i64 = 7;
pub const REFRESH_COOKIE: &str = "refresh_token";

/// Discriminates access tokens from refresh tokens. A route expecting one
/// kind rejects the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "type")]
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

/// Password hashing and JWT signing, keyed by the configured secret.
pub struct AuthService {
    jwt_secret: String,
}

impl AuthService {
    pub fn new(jwt_secret: String) -> Self {
        Self { jwt_secret }
    }

    pub fn hash_password(&self, password: &str) -> Result<String, bcrypt::BcryptError> {
        bcrypt::hash(password, bcrypt::DEFAULT_COST)
    }

    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
        bcrypt::verify(password, hash)
    }

    /// Sign a token for `subject`: 15 minutes for access, 7 days for refresh.
    pub fn issue_token(
        &self,
        subject: &str,
        kind: TokenKind,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let exp = match kind {
            TokenKind::Access => now + Duration::minutes(ACCESS_TOKEN_EXPIRE_MINUTES),
            TokenKind::Refresh => now + Duration::days(REFRESH_TOKEN_EXPIRE_DAYS),
        };

        let claims = Claims {
            sub: subject.to_string(),
            kind,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
    }

    /// Fail-closed decode: `None` unless the signature verifies, `exp` is in
    /// the future, and the token kind matches `expected`.
    pub fn decode_token(&self, token: &str, expected: TokenKind) -> Option<Claims> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .ok()?;

        if data.claims.kind != expected {
            return None;
        }
        Some(data.claims)
    }
}

/// The authenticated user for access-protected routes, resolved from the
/// `Authorization: Bearer` header. Any failure surfaces as 401.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(resolve_current_user(req))
    }
}

fn resolve_current_user(req: &HttpRequest) -> Result<CurrentUser, ApiError> {
    let auth_service = req
        .app_data::<web::Data<Arc<AuthService>>>()
        .ok_or(ApiError::Internal)?;
    let store = req
        .app_data::<web::Data<Arc<Store>>>()
        .ok_or(ApiError::Internal)?;

    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::Unauthenticated("Missing Authorization header".to_string()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::Unauthenticated("Invalid Authorization header".to_string()))?;

    let claims = auth_service
        .decode_token(token, TokenKind::Access)
        .ok_or_else(|| ApiError::Unauthenticated("Invalid token".to_string()))?;

    let user = store
        .get_user(&claims.sub)
        .map_err(|_| ApiError::Unauthenticated("User not found".to_string()))?;

    Ok(CurrentUser(user))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth() -> AuthService {
        AuthService::new("test_secret".to_string())
    }

    #[test]
    fn test_password_hashing() {
        let auth = auth();
        let hash = auth.hash_password("my_secure_password").unwrap();
        assert!(auth.verify_password("my_secure_password", &hash).unwrap());
        assert!(!auth.verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_access_token_round_trip() {
        let auth = auth();
        let token = auth.issue_token("user_123", TokenKind::Access).unwrap();
        let claims = auth.decode_token(&token, TokenKind::Access).unwrap();

        assert_eq!(claims.sub, "user_123");
        assert_eq!(claims.kind, TokenKind::Access);
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let auth = auth();
        let refresh = auth.issue_token("user_123", TokenKind::Refresh).unwrap();
        let access = auth.issue_token("user_123", TokenKind::Access).unwrap();

        assert!(auth.decode_token(&refresh, TokenKind::Access).is_none());
        assert!(auth.decode_token(&access, TokenKind::Refresh).is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let auth = auth();
        let now = Utc::now();
        let claims = Claims {
            sub: "user_123".to_string(),
            kind: TokenKind::Access,
            exp: (now - Duration::minutes(10)).timestamp(),
            iat: (now - Duration::minutes(25)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test_secret"),
        )
        .unwrap();

        assert!(auth.decode_token(&token, TokenKind::Access).is_none());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let auth = auth();
        let other = AuthService::new("different_secret".to_string());
        let token = other.issue_token("user_123", TokenKind::Access).unwrap();

        assert!(auth.decode_token(&token, TokenKind::Access).is_none());
    }
}
