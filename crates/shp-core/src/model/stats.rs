// SPDX-License-Identifier: MIT

//! Long-term accounting twin retained after a [`WebExperiment`] is pruned.

use super::web_experiment::WebExperiment;
use crate::id::ExperimentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentStats {
    pub id: ExperimentId,
    pub owner_email: String,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,

    pub state: String,
    pub duration: chrono::Duration,
    pub result_size: i64,

    pub had_errors: bool,
    pub has_missing_data: bool,
    pub max_exit_code: i32,
    pub scheduler_error: Option<String>,
    pub missing_observers: Vec<String>,
}

impl ExperimentStats {
    /// Snapshot a [`WebExperiment`] into its accounting twin. Called on
    /// every terminal transition and always before deletion.
    pub fn derive_from(xp: &WebExperiment) -> Self {
        Self {
            id: xp.id,
            owner_email: xp.owner_email.clone(),
            created_at: xp.created_at,
            started_at: xp.started_at,
            executed_at: xp.executed_at,
            finished_at: xp.finished_at,
            deleted_at: None,
            state: xp.state().to_string(),
            duration: xp.experiment.duration,
            result_size: xp.result_size,
            had_errors: xp.had_errors(),
            has_missing_data: xp.has_missing_data(),
            max_exit_code: xp.max_exit_code(),
            scheduler_error: xp.scheduler_error.clone(),
            missing_observers: xp.missing_observers(),
        }
    }

    /// Refresh an existing twin from the live record, optionally stamping
    /// a deletion time (called right before the record is actually removed).
    pub fn update_with(&mut self, xp: &WebExperiment, now: DateTime<Utc>, to_be_deleted: bool) {
        *self = Self::derive_from(xp);
        if to_be_deleted {
            self.deleted_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::experiment::Experiment;

    #[test]
    fn derive_from_preserves_identity_and_duration() {
        let xp = WebExperiment::submit("user@test.com", Experiment::builder().build(), Utc::now());
        let stats = ExperimentStats::derive_from(&xp);
        assert_eq!(stats.id, xp.id);
        assert_eq!(stats.owner_email, xp.owner_email);
        assert_eq!(stats.duration, xp.experiment.duration);
        assert!(stats.deleted_at.is_none());
    }

    #[test]
    fn update_with_stamps_deletion() {
        let xp = WebExperiment::submit("user@test.com", Experiment::builder().build(), Utc::now());
        let mut stats = ExperimentStats::derive_from(&xp);
        let now = Utc::now();
        stats.update_with(&xp, now, true);
        assert_eq!(stats.deleted_at, Some(now));
    }
}
