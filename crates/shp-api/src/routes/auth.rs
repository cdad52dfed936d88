// SPDX-License-Identifier: MIT

//! `POST /auth/token` (spec §6.2).

use axum::extract::State;
use axum::Form;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::{issue_token as sign_token, verify_password};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub access_token_expires: chrono::DateTime<Utc>,
}

/// Rejects (401) on unknown user, bad password, unverified email, or a
/// disabled account — without distinguishing which, to avoid leaking
/// account existence.
pub async fn token(State(state): State<AppState>, Form(form): Form<TokenForm>) -> Result<axum::Json<TokenResponse>, ApiError> {
    let user = state.store.find_user_by_email(&form.username).await?.ok_or(ApiError::Unauthorized)?;

    if !user.can_authenticate() || !verify_password(&form.password, &user.password_hash) {
        return Err(ApiError::Unauthorized);
    }

    let now = Utc::now();
    let (access_token, access_token_expires) = sign_token(&user, &state.config.jwt_secret, state.config.token_ttl, now)?;

    let mut next = user.clone();
    next.last_active_at = now;
    state.store.save_user_changes(&user, &next).await?;

    Ok(axum::Json(TokenResponse { access_token, token_type: "bearer", access_token_expires }))
}
