// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The C5 web API (spec §6): a stateless axum service that is the only
//! process allowed to accept user-facing HTTP traffic. It never talks to the
//! observer fleet directly except through the elevated `/testbed/command`
//! route, and it can only ever move an experiment record from `created` to
//! `scheduled` — every later transition belongs to the Scheduler.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
