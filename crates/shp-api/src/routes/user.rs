// SPDX-License-Identifier: MIT

//! `/user*` account routes (spec §6.2).

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use shp_core::model::{User, UserQuota, UserRole};
use shp_notify::Message;

use crate::auth::{hash_password, random_token, CurrentUser};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UserView {
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub group: String,
    pub role: UserRole,
    pub storage_used: i64,
    pub storage_quota: i64,
}

async fn view_of(state: &AppState, user: &User) -> Result<UserView, ApiError> {
    let used = state.store.storage_used_by(&user.email).await?;
    let quota = shp_core::QuotaEngine::new(&state.quota_defaults);
    Ok(UserView {
        email: user.email.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        group: user.group.clone(),
        role: user.role,
        storage_used: used,
        storage_quota: quota.effective_storage(user, Utc::now()),
    })
}

pub async fn get_current(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Json<UserView>, ApiError> {
    Ok(Json(view_of(&state, &user).await?))
}

#[derive(Debug, Deserialize)]
pub struct PatchUser {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

pub async fn patch_current(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(patch): Json<PatchUser>,
) -> Result<Json<UserView>, ApiError> {
    let mut next = user.clone();
    if let Some(first_name) = patch.first_name {
        next.first_name = Some(first_name);
    }
    if let Some(last_name) = patch.last_name {
        next.last_name = Some(last_name);
    }
    if let Some(password) = patch.password {
        next.password_hash = hash_password(&password)?;
    }

    if let Some(new_email) = patch.email.filter(|e| *e != user.email) {
        state.store.rename_user(&user.email, &new_email).await?;
        next.email = new_email;
    } else {
        state.store.save_user_changes(&user, &next).await?;
    }

    Ok(Json(view_of(&state, &next).await?))
}

pub async fn delete_current(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> Result<impl IntoResponse, ApiError> {
    for xp in state.store.find_experiments_by_owner(&user.email).await? {
        for path in xp.content_paths.values().chain(xp.result_paths.values()) {
            let _ = tokio::fs::remove_file(path).await;
        }
        state.store.delete_experiment(xp.id).await?;
    }
    state.store.delete_user(&user.email).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct PatchQuota {
    pub email: String,
    pub custom_quota_expire_date: Option<chrono::DateTime<Utc>>,
    pub custom_quota_duration_secs: Option<i64>,
    pub custom_quota_storage: Option<i64>,
}

pub async fn patch_quota(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    Json(patch): Json<PatchQuota>,
) -> Result<Json<UserView>, ApiError> {
    caller.require_admin()?;
    let user = state.store.find_user_by_email(&patch.email).await?.ok_or(ApiError::NotFound("user not found".to_string()))?;
    let mut next = user.clone();
    next.quota = UserQuota {
        custom_quota_expire_date: patch.custom_quota_expire_date,
        custom_quota_duration: patch.custom_quota_duration_secs.map(chrono::Duration::seconds),
        custom_quota_storage: patch.custom_quota_storage,
    };
    state.store.save_user_changes(&user, &next).await?;
    Ok(Json(view_of(&state, &next).await?))
}

#[derive(Debug, Deserialize)]
pub struct EmailOnly {
    pub email: String,
}

/// Always returns 200 regardless of whether the email is registered, so a
/// caller cannot use this endpoint to enumerate accounts.
pub async fn forgot_password(State(state): State<AppState>, Json(body): Json<EmailOnly>) -> Result<impl IntoResponse, ApiError> {
    if let Some(user) = state.store.find_user_by_email(&body.email).await? {
        let mut next = user.clone();
        let token = random_token();
        next.token_pw_reset = Some(token.clone());
        state.store.save_user_changes(&user, &next).await?;
        let _ = state
            .mail
            .send(&Message {
                to: vec![user.email.clone()],
                subject: "[shepherd] password reset".to_string(),
                body: format!("Reset token: {token}"),
                attachments: Vec::new(),
            })
            .await;
    }
    Ok(axum::http::StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct ResetPassword {
    pub token: String,
    pub new_password: String,
}

pub async fn reset_password(State(state): State<AppState>, Json(body): Json<ResetPassword>) -> Result<impl IntoResponse, ApiError> {
    let user = state.store.find_user_by_reset_token(&body.token).await?.ok_or(ApiError::Unauthorized)?;
    let mut next = user.clone();
    next.password_hash = hash_password(&body.new_password)?;
    next.token_pw_reset = None;
    state.store.save_user_changes(&user, &next).await?;
    Ok(axum::http::StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct Register {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub group: String,
}

/// New accounts start `disabled` and unconfirmed: they need both an email
/// verification (self-service, via the mailed token) and an admin approval
/// (`POST /user/approve`) before `can_authenticate()`.
pub async fn register(State(state): State<AppState>, Json(body): Json<Register>) -> Result<impl IntoResponse, ApiError> {
    if state.store.find_user_by_email(&body.email).await?.is_some() {
        return Err(ApiError::Conflict(format!("email already in use: {}", body.email)));
    }
    let now = Utc::now();
    let token = random_token();
    let user = User {
        email: body.email.clone(),
        password_hash: hash_password(&body.password)?,
        first_name: body.first_name,
        last_name: body.last_name,
        group: body.group,
        role: UserRole::User,
        disabled: true,
        quota: UserQuota::default(),
        created_at: now,
        last_active_at: now,
        email_confirmed_at: None,
        token_verification: Some(token.clone()),
        token_pw_reset: None,
    };
    state.store.insert_user(&user).await?;
    let _ = state
        .mail
        .send(&Message {
            to: vec![user.email.clone()],
            subject: "[shepherd] verify your account".to_string(),
            body: format!("Verification token: {token}"),
            attachments: Vec::new(),
        })
        .await;
    Ok(axum::http::StatusCode::CREATED)
}

pub async fn verify(State(state): State<AppState>, Path(token): Path<String>) -> Result<impl IntoResponse, ApiError> {
    let user = state.store.find_user_by_verification_token(&token).await?.ok_or(ApiError::NotFound("unknown verification token".to_string()))?;
    let mut next = user.clone();
    next.email_confirmed_at = Some(Utc::now());
    next.token_verification = None;
    state.store.save_user_changes(&user, &next).await?;
    Ok(axum::http::StatusCode::OK)
}

pub async fn approve(State(state): State<AppState>, CurrentUser(caller): CurrentUser, Json(body): Json<EmailOnly>) -> Result<impl IntoResponse, ApiError> {
    caller.require_admin()?;
    let user = state.store.find_user_by_email(&body.email).await?.ok_or(ApiError::NotFound("user not found".to_string()))?;
    let mut next = user.clone();
    next.disabled = false;
    state.store.save_user_changes(&user, &next).await?;
    Ok(axum::http::StatusCode::OK)
}
