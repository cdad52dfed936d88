// SPDX-License-Identifier: MIT

//! `/testbed*` routes (spec §6.2): fleet status, restriction banners, and
//! the elevated-only command dispatch onto [`shp_herd::Herd`].

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TestbedInfo {
    name: String,
}

pub async fn info(State(state): State<AppState>) -> Json<TestbedInfo> {
    Json(TestbedInfo { name: state.config.testbed_name.clone() })
}

pub async fn get_restrictions(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.store.load_testbed_status().await?.restrictions))
}

pub async fn set_restrictions(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(restrictions): Json<Vec<String>>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require_admin()?;
    let prev = state.store.load_testbed_status().await?;
    let mut next = prev.clone();
    next.restrictions = restrictions;
    state.store.save_testbed_status_changes(&prev, &next).await?;
    Ok(axum::http::StatusCode::OK)
}

const HERD_CMDS: &[&str] = &["restart", "resync", "inventorize", "stop-measurement", "min-space"];
const SERVER_CMDS: &[&str] = &["start-scheduler", "stop-scheduler"];

pub async fn list_commands(caller: CurrentUser) -> Result<Json<Vec<String>>, ApiError> {
    caller.require_elevated()?;
    Ok(Json(HERD_CMDS.iter().chain(SERVER_CMDS).map(|s| s.to_string()).collect()))
}

#[derive(Debug, Deserialize)]
pub struct CommandQuery {
    pub cmd: String,
}

/// Mirrors the original testbed controller's `herd_cmds`/`server_cmds`
/// split: fleet-wide actions go through [`shp_herd::Herd`], scheduler
/// lifecycle toggles the shared [`shp_core::model::TestbedStatus`] instead
/// of shelling out to systemd.
pub async fn run_command(
    State(state): State<AppState>,
    caller: CurrentUser,
    Query(query): Query<CommandQuery>,
) -> Result<impl IntoResponse, ApiError> {
    caller.require_elevated()?;
    let cmd = query.cmd.to_lowercase();

    if HERD_CMDS.contains(&cmd.as_str()) {
        let online = state.herd.online_set().await?.into_iter().collect::<Vec<_>>();
        match cmd.as_str() {
            "restart" => state.herd.reboot(&online).await?,
            "resync" => state.herd.resync().await?,
            "inventorize" => {
                state.herd.inventorize().await?;
            }
            "stop-measurement" => state.herd.kill_sheep_process(&online).await?,
            "min-space" => {
                let free = state.herd.min_space_left(&online).await?;
                return Ok((axum::http::StatusCode::OK, free.to_string()));
            }
            _ => unreachable!(),
        }
        return Ok((axum::http::StatusCode::OK, "Command successfully executed".to_string()));
    }

    if SERVER_CMDS.contains(&cmd.as_str()) {
        let prev = state.store.load_testbed_status().await?;
        let mut next = prev.clone();
        next.scheduler.activated = if cmd == "start-scheduler" { Some(Utc::now()) } else { None };
        state.store.save_testbed_status_changes(&prev, &next).await?;
        return Ok((axum::http::StatusCode::OK, "Command successfully executed".to_string()));
    }

    Err(ApiError::NotFound(format!("unknown command: {cmd}")))
}
