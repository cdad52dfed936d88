// SPDX-License-Identifier: MIT

//! Error types owned by the core crate: invariant violations on the data
//! model and quota-resolution failures. Store/Herd/Notify/Scheduler errors
//! live in their own crates and wrap these with `#[from]` where relevant.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("requested_execution_at can only be set while the experiment is in Created state")]
    NotCreatedState,

    #[error("experiment {0} has no owner quota configured")]
    MissingQuota(crate::id::ExperimentId),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("user has exceeded their duration quota ({used}s used of {allowed}s allowed)")]
    DurationExceeded { used: i64, allowed: i64 },

    #[error("user has exceeded their storage quota ({used} bytes used of {allowed} bytes allowed)")]
    StorageExceeded { used: i64, allowed: i64 },

    #[error("user account is disabled")]
    AccountDisabled,

    #[error("invalid experiment submission: {0}")]
    InvalidExperiment(String),
}
