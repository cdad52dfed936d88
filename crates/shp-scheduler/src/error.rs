// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] shp_store::StoreError),

    #[error(transparent)]
    Herd(#[from] shp_herd::HerdError),

    #[error(transparent)]
    Notify(#[from] shp_notify::NotifyError),

    #[error(transparent)]
    Core(#[from] shp_core::CoreError),

    #[error("database unreachable at startup: {0}")]
    DatabaseUnreachable(shp_store::StoreError),
}
