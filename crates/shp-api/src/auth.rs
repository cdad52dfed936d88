// SPDX-License-Identifier: MIT

//! Password hashing (argon2), JWT issuance/verification (jsonwebtoken), and
//! the `CurrentUser` extractor every protected route pulls its caller from.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use shp_core::model::{User, UserRole};

use crate::error::ApiError;
use crate::state::AppState;

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ApiError::Internal(format!("password hash: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else { return false };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

/// JWT claims: subject is the user's email, `exp` the standard Unix
/// expiry, `role` cached so authorization checks don't need a Store hit
/// for every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: UserRole,
    pub exp: i64,
}

pub fn issue_token(user: &User, secret: &str, ttl: chrono::Duration, now: DateTime<Utc>) -> Result<(String, DateTime<Utc>), ApiError> {
    let expires = now + ttl;
    let claims = Claims { sub: user.email.clone(), role: user.role, exp: expires.timestamp() };
    let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| ApiError::Internal(format!("jwt encode: {e}")))?;
    Ok((token, expires))
}

fn decode_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
        .map(|data| data.claims)
        .map_err(|_| ApiError::Unauthorized)
}

/// The authenticated caller, resolved from the bearer token and re-loaded
/// from the Store on every request (so a disabled/deleted account is
/// rejected immediately rather than at next token expiry).
pub struct CurrentUser(pub User);

impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;
        let claims = decode_token(token, &state.config.jwt_secret)?;
        let user = state.store.find_user_by_email(&claims.sub).await?.ok_or(ApiError::Unauthorized)?;
        if user.disabled {
            return Err(ApiError::Unauthorized);
        }
        Ok(CurrentUser(user))
    }
}

impl CurrentUser {
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.0.role == UserRole::Admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }

    pub fn require_elevated(&self) -> Result<(), ApiError> {
        if matches!(self.0.role, UserRole::Admin | UserRole::Elevated) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }

    pub fn may_act_as(&self, owner_email: &str) -> Result<(), ApiError> {
        if self.0.email == owner_email || self.0.role == UserRole::Admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

/// Generates a random hex token for email verification / password reset.
pub fn random_token() -> String {
    use rand::Rng;
    let bytes: [u8; 24] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
