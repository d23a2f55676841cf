//! Password hashing, bearer tokens and the middleware guarding protected routes.

use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::error::{AppError, Result};
use crate::models::{Role, User};
use crate::AppState;

// === Passwords ===

/// Hashes with Argon2id into a PHC string. CPU bound; call from a blocking task.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::PasswordHash(e.to_string()))
}

/// Returns `Ok(false)` on mismatch; errors only on an unparseable stored hash.
pub fn verify_password(password: &str, stored: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored).map_err(|e| AppError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Stand-in hash verified when a login names no known user, so both failure
/// paths cost one Argon2 verification.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("hangar-dummy-password").ok());

/// Burns one verification against [`DUMMY_HASH`]; always reports a mismatch.
pub fn verify_unknown_user(password: &str) -> Result<bool> {
    if let Some(hash) = DUMMY_HASH.as_deref() {
        verify_password(password, hash)?;
    }
    Ok(false)
}

// === Tokens ===

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 tokens with the server secret.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::Internal("token expiry out of range".into()))?;
        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "rejected bearer token");
                AppError::InvalidToken
            })
    }
}

// === Request identity ===

/// Identity decoded from a verified token, available to handlers behind
/// [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub role: Role,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username,
            role: claims.role,
        }
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AppError::TokenRequired)
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::TokenRequired)
}

// === Middleware ===

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let token = bearer_token(request.headers())?;
    let claims = state.tokens.verify(token)?;

    request.extensions_mut().insert(AuthUser::from(claims));
    Ok(next.run(request).await)
}

/// Must sit inside [`require_auth`].
pub async fn require_admin(user: AuthUser, request: Request, next: Next) -> Result<Response> {
    if user.role != Role::Admin {
        tracing::warn!(user_id = %user.id, role = %user.role, "admin route denied");
        return Err(AppError::AdminRequired);
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: Role) -> User {
        User {
            id: "user-1".into(),
            username: "pilot".into(),
            email: "pilot@example.com".into(),
            password_hash: String::new(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_hash_verify() {
        let hash = hash_password("test_password_123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("test_password_123", &hash).unwrap());
        assert!(!verify_password("wrong_password", &hash).unwrap());
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_unknown_user_runs_a_real_verification() {
        let hash = DUMMY_HASH.as_deref().unwrap();
        assert!(hash.starts_with("$argon2id$"));
        // the stand-in hash parses and verifies, so the full Argon2 cost is paid
        assert!(verify_password("hangar-dummy-password", hash).unwrap());
        assert!(!verify_unknown_user("hangar-dummy-password").unwrap());
        assert!(!verify_unknown_user("anything").unwrap());
    }

    #[test]
    fn test_out_of_range_expiry_is_an_error() {
        let tokens = TokenService::new("test-secret", Duration::hours(1_000_000_000_000));
        assert!(matches!(
            tokens.issue(&user(Role::Viewer)),
            Err(AppError::Internal(_))
        ));
    }

    #[test]
    fn test_token_round_trip_carries_identity() {
        let tokens = TokenService::new("test-secret", Duration::hours(24));
        let token = tokens.issue(&user(Role::Manager)).unwrap();
        let claims = tokens.verify(&token).unwrap();

        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.username, "pilot");
        assert_eq!(claims.role, Role::Manager);
        assert_eq!(claims.exp - claims.iat, 24 * 3600);
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let ours = TokenService::new("test-secret", Duration::hours(24));
        let theirs = TokenService::new("other-secret", Duration::hours(24));
        let token = theirs.issue(&user(Role::Admin)).unwrap();

        assert!(matches!(ours.verify(&token), Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let tokens = TokenService::new("test-secret", Duration::hours(-1));
        let token = tokens.issue(&user(Role::Viewer)).unwrap();

        assert!(matches!(tokens.verify(&token), Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_malformed_token_is_rejected() {
        let tokens = TokenService::new("test-secret", Duration::hours(24));
        assert!(matches!(tokens.verify("not.a.token"), Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(AppError::TokenRequired)));

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert!(matches!(bearer_token(&headers), Err(AppError::TokenRequired)));

        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert!(matches!(bearer_token(&headers), Err(AppError::TokenRequired)));

        headers.insert(AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
    }
}
