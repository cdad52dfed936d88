// SPDX-License-Identifier: MIT

//! `/experiment*` routes (spec §6.2, §6.4).

use std::collections::BTreeMap;
use std::path::{Path as FsPath, PathBuf};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use shp_core::model::{Experiment, ExperimentState, WebExperiment};
use shp_core::{ExperimentId, QuotaEngine, QuotaError};
use shp_store::StoreError;

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn submit(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(experiment): Json<Experiment>,
) -> Result<(StatusCode, Json<WebExperiment>), ApiError> {
    let now = Utc::now();
    let engine = QuotaEngine::new(&state.quota_defaults);
    engine.may_submit(&user, &experiment, now)?;

    let xp = WebExperiment::submit(user.email.clone(), experiment, now);
    state.store.insert_experiment(&xp).await?;
    Ok((StatusCode::CREATED, Json(xp)))
}

pub async fn list_mine(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<BTreeMap<ExperimentId, ExperimentState>>, ApiError> {
    Ok(Json(state.store.all_experiment_states(Some(&user.email)).await?))
}

pub async fn list_all(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
) -> Result<Json<BTreeMap<ExperimentId, ExperimentState>>, ApiError> {
    caller.require_admin()?;
    Ok(Json(state.store.all_experiment_states(None).await?))
}

async fn load_owned(state: &AppState, caller: &CurrentUser, id: ExperimentId) -> Result<WebExperiment, ApiError> {
    let xp = state.store.find_experiment(id).await?.ok_or(ApiError::NotFound("experiment not found".to_string()))?;
    caller.may_act_as(&xp.owner_email)?;
    Ok(xp)
}

pub async fn get_one(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<ExperimentId>,
) -> Result<Json<WebExperiment>, ApiError> {
    Ok(Json(load_owned(&state, &caller, id).await?))
}

pub async fn delete_one(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<ExperimentId>,
) -> Result<impl IntoResponse, ApiError> {
    let xp = load_owned(&state, &caller, id).await?;
    if xp.state() == ExperimentState::Running {
        return Err(ApiError::Conflict("cannot delete a running experiment".to_string()));
    }
    for path in xp.content_paths.values().chain(xp.result_paths.values()) {
        let _ = tokio::fs::remove_file(path).await;
    }
    state.store.delete_experiment(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct ScheduleRejected {
    error: String,
    storage_used_gib: String,
    storage_quota_gib: String,
}

fn gib(bytes: i64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0 * 1024.0)
}

pub async fn schedule(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<ExperimentId>,
) -> Result<impl IntoResponse, ApiError> {
    let xp = load_owned(&state, &caller, id).await?;
    let owner = state.store.find_user_by_email(&xp.owner_email).await?.ok_or(ApiError::Internal("experiment owner vanished".to_string()))?;

    let now = Utc::now();
    let used = state.store.storage_used_by(&owner.email).await?;
    let engine = QuotaEngine::new(&state.quota_defaults);
    if let Err(QuotaError::StorageExceeded { used, allowed }) = engine.may_schedule(&owner, used, now) {
        let body = ScheduleRejected {
            error: "storage quota exceeded".to_string(),
            storage_used_gib: format!("{:.3}", gib(used)),
            storage_quota_gib: format!("{:.3}", gib(allowed)),
        };
        return Ok((StatusCode::CONFLICT, Json(body)).into_response());
    }

    match state.store.request_schedule_experiment(id, now).await {
        Ok(xp) => Ok((StatusCode::OK, Json(xp)).into_response()),
        Err(StoreError::InvalidTransition(msg)) => Err(ApiError::Conflict(msg)),
        Err(e) => Err(ApiError::from(e)),
    }
}

#[derive(Debug, Serialize)]
pub struct StateView {
    state: ExperimentState,
}

pub async fn state(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<ExperimentId>,
) -> Result<Json<StateView>, ApiError> {
    let xp = load_owned(&state, &caller, id).await?;
    Ok(Json(StateView { state: xp.state() }))
}

pub async fn download_list(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<ExperimentId>,
) -> Result<Json<Vec<String>>, ApiError> {
    let xp = load_owned(&state, &caller, id).await?;
    if xp.state() != ExperimentState::Finished {
        return Err(ApiError::Conflict("experiment has no downloadable results yet".to_string()));
    }
    Ok(Json(xp.result_paths.keys().cloned().collect()))
}

/// Confines a requested artifact path to `root`, rejecting anything a
/// canonicalized lookup resolves outside it (symlink escapes included).
fn confine(root: &FsPath, candidate: &PathBuf) -> Result<PathBuf, ApiError> {
    let root = root.canonicalize().map_err(|e| ApiError::Internal(format!("experiment root: {e}")))?;
    let resolved = candidate.canonicalize().map_err(|_| ApiError::NotFound("result file not found".to_string()))?;
    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(ApiError::NotFound("result file not found".to_string()))
    }
}

pub async fn download_one(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path((id, observer)): Path<(ExperimentId, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let xp = load_owned(&state, &caller, id).await?;
    if xp.state() != ExperimentState::Finished {
        return Err(ApiError::Conflict("experiment has no downloadable results yet".to_string()));
    }
    let path = xp.result_paths.get(&observer).ok_or(ApiError::NotFound("no result for that observer".to_string()))?;
    let path = confine(&state.config.experiment_root, path)?;

    let bytes = tokio::fs::read(&path).await.map_err(|_| ApiError::NotFound("result file not found".to_string()))?;
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("result.h5").to_string();
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/x-hdf5".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        Body::from(bytes),
    ))
}
