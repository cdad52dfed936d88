// SPDX-License-Identifier: MIT

//! C1 Store contract (spec §4.1): atomic single-document upserts, a
//! partial-field `save_changes` for concurrent-safe writes, and the handful
//! of predicate/sort queries the Scheduler and API rely on.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shp_core::id::ExperimentId;
use shp_core::model::{ExperimentState, ExperimentStats, TestbedStatus, User, WebExperiment};
use std::collections::BTreeMap;

#[async_trait]
pub trait Store: Send + Sync + 'static {
    // --- Users ---

    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;
    /// Whole-record upsert. Last-writer-wins on fields that changed.
    async fn save_user(&self, user: &User) -> Result<(), StoreError>;
    /// Persists only the fields that differ between `prev` and `next`.
    async fn save_user_changes(&self, prev: &User, next: &User) -> Result<(), StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_verification_token(&self, token: &str) -> Result<Option<User>, StoreError>;
    async fn find_user_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError>;
    async fn find_all_users(&self) -> Result<Vec<User>, StoreError>;
    async fn delete_user(&self, email: &str) -> Result<(), StoreError>;
    /// Renames a user's email, cascading onto every experiment they own.
    /// Fails with [`StoreError::EmailTaken`] if `new_email` is in use.
    async fn rename_user(&self, old_email: &str, new_email: &str) -> Result<(), StoreError>;

    // --- Experiments ---

    async fn insert_experiment(&self, xp: &WebExperiment) -> Result<(), StoreError>;
    async fn save_experiment(&self, xp: &WebExperiment) -> Result<(), StoreError>;
    async fn save_experiment_changes(&self, prev: &WebExperiment, next: &WebExperiment) -> Result<(), StoreError>;
    async fn find_experiment(&self, id: ExperimentId) -> Result<Option<WebExperiment>, StoreError>;
    async fn find_experiments_by_owner(&self, owner_email: &str) -> Result<Vec<WebExperiment>, StoreError>;
    async fn find_all_experiments(&self) -> Result<Vec<WebExperiment>, StoreError>;
    async fn all_experiment_states(
        &self,
        owner_email: Option<&str>,
    ) -> Result<BTreeMap<ExperimentId, ExperimentState>, StoreError>;
    async fn storage_used_by(&self, owner_email: &str) -> Result<i64, StoreError>;
    /// `find_one(requested_execution_at≠∅ ∧ started_at=∅, sort asc, limit 1)`,
    /// filtered to elevated/admin owners when `only_elevated` is set.
    async fn next_scheduled(&self, only_elevated: bool) -> Result<Option<WebExperiment>, StoreError>;
    async fn has_scheduled_by_user(&self, owner_email: &str) -> Result<bool, StoreError>;
    async fn delete_experiment(&self, id: ExperimentId) -> Result<(), StoreError>;

    /// The single write path the API may use on an experiment record: sets
    /// `requested_execution_at` via [`WebExperiment::request_schedule`] and
    /// rejects (without touching the record) outside `created` state. This
    /// is the store-layer guard against the API writing any field the
    /// Scheduler owns from pickup onward — there is no generic
    /// "save whatever fields the caller changed" entry point exposed here.
    async fn request_schedule_experiment(&self, id: ExperimentId, now: DateTime<Utc>) -> Result<WebExperiment, StoreError>;

    // --- TestbedStatus (singleton) ---

    async fn load_testbed_status(&self) -> Result<TestbedStatus, StoreError>;
    async fn save_testbed_status_changes(&self, prev: &TestbedStatus, next: &TestbedStatus) -> Result<(), StoreError>;

    // --- ExperimentStats ---

    async fn save_experiment_stats(&self, stats: &ExperimentStats) -> Result<(), StoreError>;
    async fn find_experiment_stats(&self, id: ExperimentId) -> Result<Option<ExperimentStats>, StoreError>;
}

/// Computes the top-level object keys that differ between two serialized
/// snapshots of the same record, for `save_changes`'s "only persist what
/// changed" contract. Used by the Postgres backend to build a
/// `data || jsonb_build_object(...)` merge payload.
pub fn changed_fields(prev: &serde_json::Value, next: &serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    let mut changed = serde_json::Map::new();
    let (Some(prev_obj), Some(next_obj)) = (prev.as_object(), next.as_object()) else {
        return changed;
    };
    for (key, next_value) in next_obj {
        if prev_obj.get(key) != Some(next_value) {
            changed.insert(key.clone(), next_value.clone());
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn changed_fields_reports_only_differing_keys() {
        let prev = json!({"a": 1, "b": 2, "c": 3});
        let next = json!({"a": 1, "b": 5, "c": 3});
        let changed = changed_fields(&prev, &next);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed.get("b"), Some(&json!(5)));
    }

    #[test]
    fn changed_fields_is_empty_for_identical_snapshots() {
        let v = json!({"a": 1});
        assert!(changed_fields(&v, &v).is_empty());
    }
}
