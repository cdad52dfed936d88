// SPDX-License-Identifier: MIT

//! C3 Quota engine: resolves effective per-user limits and answers
//! `may_submit`/`may_schedule` for a declarative [`Experiment`].

use crate::error::QuotaError;
use crate::model::{Experiment, User};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Configured defaults, resolved once at startup and passed in explicitly.
#[derive(Debug, Clone)]
pub struct QuotaDefaults {
    pub duration: chrono::Duration,
    pub storage_bytes: i64,
    /// Firmware/tracing file paths outside this root are rejected at submit.
    pub experiment_root: std::path::PathBuf,
}

/// Stateless resolver over a [`User`] and its [`QuotaDefaults`].
pub struct QuotaEngine<'a> {
    defaults: &'a QuotaDefaults,
}

impl<'a> QuotaEngine<'a> {
    pub fn new(defaults: &'a QuotaDefaults) -> Self {
        Self { defaults }
    }

    pub fn effective_duration(&self, user: &User, now: DateTime<Utc>) -> chrono::Duration {
        user.quota.quota_duration(now, self.defaults.duration)
    }

    pub fn effective_storage(&self, user: &User, now: DateTime<Utc>) -> i64 {
        user.quota.quota_storage(now, self.defaults.storage_bytes)
    }

    /// Validates a declarative submission against account state and quota.
    /// Never touches the Store; `user` must already be loaded.
    pub fn may_submit(&self, user: &User, experiment: &Experiment, now: DateTime<Utc>) -> Result<(), QuotaError> {
        if user.disabled {
            return Err(QuotaError::AccountDisabled);
        }
        if experiment.time_start.is_some() {
            return Err(QuotaError::InvalidExperiment("time_start must be unset at submission".to_string()));
        }
        if experiment.duration <= chrono::Duration::zero() {
            return Err(QuotaError::InvalidExperiment("duration must be positive".to_string()));
        }
        let allowed = self.effective_duration(user, now);
        if experiment.duration > allowed {
            return Err(QuotaError::DurationExceeded {
                used: experiment.duration.num_seconds(),
                allowed: allowed.num_seconds(),
            });
        }
        for target in &experiment.target_configs {
            for path in [&target.firmware1, &target.firmware2].into_iter().flatten() {
                if !is_within_root(path, &self.defaults.experiment_root) {
                    return Err(QuotaError::InvalidExperiment(format!(
                        "firmware path outside experiment root: {}",
                        path.display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Validates that scheduling would not push the user over their
    /// storage quota. `used_storage` is the sum of `result_size` across
    /// the user's current experiments, computed by the Store.
    pub fn may_schedule(&self, user: &User, used_storage: i64, now: DateTime<Utc>) -> Result<(), QuotaError> {
        let allowed = self.effective_storage(user, now);
        if used_storage > allowed {
            return Err(QuotaError::StorageExceeded { used: used_storage, allowed });
        }
        Ok(())
    }
}

fn is_within_root(path: &Path, root: &Path) -> bool {
    // Paths are declarative references at submit time (files may not exist
    // yet on this host), so this is a lexical containment check, not a
    // filesystem canonicalization.
    path.components().all(|c| !matches!(c, std::path::Component::ParentDir))
        && path.starts_with(root)
}
