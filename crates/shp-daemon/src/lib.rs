// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Process entrypoints: `shp-scheduler-bin` runs the C5 Scheduler loop,
//! `shp-api-bin` serves the C7 HTTP API. Both resolve the same [`Config`]
//! from the environment and wire it onto the same Postgres-backed Store.

pub mod config;
pub mod tracing_init;

pub use config::Config;
