// SPDX-License-Identifier: MIT

//! Route tree assembly: public auth/account routes plus everything else
//! behind the `CurrentUser` extractor (spec §6.2).

pub mod auth;
pub mod experiment;
pub mod testbed;
pub mod user;

use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth/token", post(auth::token))
        .route("/user", get(user::get_current))
        .route("/user", patch(user::patch_current))
        .route("/user", delete(user::delete_current))
        .route("/user/quota", patch(user::patch_quota))
        .route("/user/forgot-password", post(user::forgot_password))
        .route("/user/reset-password", post(user::reset_password))
        .route("/user/register", post(user::register))
        .route("/user/approve", post(user::approve))
        .route("/user/verify/:token", get(user::verify))
        .route("/user/verify/:token", post(user::verify))
        .route("/experiment", post(experiment::submit))
        .route("/experiment", get(experiment::list_mine))
        .route("/experiment/all", get(experiment::list_all))
        .route("/experiment/:id", get(experiment::get_one))
        .route("/experiment/:id", delete(experiment::delete_one))
        .route("/experiment/:id/schedule", post(experiment::schedule))
        .route("/experiment/:id/state", get(experiment::state))
        .route("/experiment/:id/download", get(experiment::download_list))
        .route("/experiment/:id/download/:observer", get(experiment::download_one))
        .route("/testbed", get(testbed::info))
        .route("/testbed/restrictions", get(testbed::get_restrictions))
        .route("/testbed/restrictions", patch(testbed::set_restrictions))
        .route("/testbed/command", get(testbed::list_commands))
        .route("/testbed/command", patch(testbed::run_command))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
