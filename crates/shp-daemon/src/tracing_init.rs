// SPDX-License-Identifier: MIT

//! Structured logging setup, shared by both binaries. Library crates only
//! emit `tracing` events; the subscriber is initialized once here, in the
//! process entrypoint, never inside a library.

use tracing_subscriber::EnvFilter;

pub fn init(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();
}
