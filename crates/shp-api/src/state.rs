// SPDX-License-Identifier: MIT

//! Shared application state passed to every handler.

use std::sync::Arc;

use shp_core::QuotaDefaults;
use shp_herd::Herd;
use shp_notify::NotifyAdapter;
use shp_store::Store;

use crate::config::ApiConfig;

/// Shared application state.
///
/// Fields are grouped by concern:
/// - **Persistence** — the Store, the sole source of truth
/// - **Fleet access** — Herd, used only by the elevated `/testbed/command` route
/// - **Mail** — the raw adapter; account-flow mail bypasses the Scheduler's Notifier
/// - **Policy** — quota defaults, config
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub herd: Arc<dyn Herd>,
    pub mail: Arc<dyn NotifyAdapter>,

    pub quota_defaults: Arc<QuotaDefaults>,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        herd: Arc<dyn Herd>,
        mail: Arc<dyn NotifyAdapter>,
        quota_defaults: Arc<QuotaDefaults>,
        config: Arc<ApiConfig>,
    ) -> Self {
        Self { store, herd, mail, quota_defaults, config }
    }
}
