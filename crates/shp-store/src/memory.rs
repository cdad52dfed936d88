// SPDX-License-Identifier: MIT

//! In-process [`Store`] for unit and scheduler tests: a real implementation
//! behind the trait, not a mock — the same pattern the notify/herd crates
//! use for their fake adapters.

use crate::error::StoreError;
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shp_core::id::ExperimentId;
use shp_core::model::{ExperimentState, ExperimentStats, TestbedStatus, User, UserRole, WebExperiment};
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    experiments: HashMap<ExperimentId, WebExperiment>,
    stats: HashMap<ExperimentId, ExperimentStats>,
    testbed_status: Option<TestbedStatus>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.users.contains_key(&user.email) {
            return Err(StoreError::EmailTaken(user.email.clone()));
        }
        inner.users.insert(user.email.clone(), user.clone());
        Ok(())
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        self.inner.lock().users.insert(user.email.clone(), user.clone());
        Ok(())
    }

    async fn save_user_changes(&self, prev: &User, next: &User) -> Result<(), StoreError> {
        let _ = prev;
        self.inner.lock().users.insert(next.email.clone(), next.clone());
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().users.get(email).cloned())
    }

    async fn find_user_by_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().users.values().find(|u| u.token_verification.as_deref() == Some(token)).cloned())
    }

    async fn find_user_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().users.values().find(|u| u.token_pw_reset.as_deref() == Some(token)).cloned())
    }

    async fn find_all_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.inner.lock().users.values().cloned().collect())
    }

    async fn delete_user(&self, email: &str) -> Result<(), StoreError> {
        self.inner.lock().users.remove(email);
        Ok(())
    }

    async fn rename_user(&self, old_email: &str, new_email: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.users.contains_key(new_email) {
            return Err(StoreError::EmailTaken(new_email.to_string()));
        }
        let mut user = inner.users.remove(old_email).ok_or(StoreError::NotFound)?;
        user.rename(new_email);
        inner.users.insert(new_email.to_string(), user);
        for xp in inner.experiments.values_mut().filter(|xp| xp.owner_email == old_email) {
            xp.owner_email = new_email.to_string();
        }
        Ok(())
    }

    async fn insert_experiment(&self, xp: &WebExperiment) -> Result<(), StoreError> {
        self.inner.lock().experiments.insert(xp.id, xp.clone());
        Ok(())
    }

    async fn save_experiment(&self, xp: &WebExperiment) -> Result<(), StoreError> {
        self.inner.lock().experiments.insert(xp.id, xp.clone());
        Ok(())
    }

    async fn save_experiment_changes(&self, prev: &WebExperiment, next: &WebExperiment) -> Result<(), StoreError> {
        let _ = prev;
        self.inner.lock().experiments.insert(next.id, next.clone());
        Ok(())
    }

    async fn find_experiment(&self, id: ExperimentId) -> Result<Option<WebExperiment>, StoreError> {
        Ok(self.inner.lock().experiments.get(&id).cloned())
    }

    async fn find_experiments_by_owner(&self, owner_email: &str) -> Result<Vec<WebExperiment>, StoreError> {
        let mut xps: Vec<_> = self.inner.lock().experiments.values().filter(|xp| xp.owner_email == owner_email).cloned().collect();
        xps.sort_by_key(|xp| xp.created_at);
        Ok(xps)
    }

    async fn find_all_experiments(&self) -> Result<Vec<WebExperiment>, StoreError> {
        Ok(self.inner.lock().experiments.values().cloned().collect())
    }

    async fn all_experiment_states(
        &self,
        owner_email: Option<&str>,
    ) -> Result<BTreeMap<ExperimentId, ExperimentState>, StoreError> {
        let experiments = match owner_email {
            Some(email) => self.find_experiments_by_owner(email).await?,
            None => self.find_all_experiments().await?,
        };
        Ok(experiments.into_iter().map(|xp| (xp.id, xp.state())).collect())
    }

    async fn storage_used_by(&self, owner_email: &str) -> Result<i64, StoreError> {
        Ok(self.inner.lock().experiments.values().filter(|xp| xp.owner_email == owner_email).map(|xp| xp.result_size).sum())
    }

    async fn next_scheduled(&self, only_elevated: bool) -> Result<Option<WebExperiment>, StoreError> {
        let inner = self.inner.lock();
        let mut candidates: Vec<_> = inner
            .experiments
            .values()
            .filter(|xp| xp.requested_execution_at.is_some() && xp.started_at.is_none())
            .filter(|xp| {
                if !only_elevated {
                    return true;
                }
                inner
                    .users
                    .get(&xp.owner_email)
                    .is_some_and(|u| matches!(u.role, UserRole::Admin | UserRole::Elevated))
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|xp| (xp.requested_execution_at, xp.id.as_uuid()));
        Ok(candidates.into_iter().next())
    }

    async fn has_scheduled_by_user(&self, owner_email: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .experiments
            .values()
            .any(|xp| xp.owner_email == owner_email && xp.requested_execution_at.is_some() && xp.started_at.is_none()))
    }

    async fn delete_experiment(&self, id: ExperimentId) -> Result<(), StoreError> {
        self.inner.lock().experiments.remove(&id);
        Ok(())
    }

    async fn request_schedule_experiment(&self, id: ExperimentId, now: DateTime<Utc>) -> Result<WebExperiment, StoreError> {
        let mut inner = self.inner.lock();
        let mut xp = inner.experiments.get(&id).cloned().ok_or(StoreError::NotFound)?;
        xp.request_schedule(now).map_err(|e| StoreError::InvalidTransition(e.to_string()))?;
        inner.experiments.insert(id, xp.clone());
        Ok(xp)
    }

    async fn load_testbed_status(&self) -> Result<TestbedStatus, StoreError> {
        let mut inner = self.inner.lock();
        Ok(inner.testbed_status.get_or_insert_with(TestbedStatus::default).clone())
    }

    async fn save_testbed_status_changes(&self, prev: &TestbedStatus, next: &TestbedStatus) -> Result<(), StoreError> {
        let _ = prev;
        self.inner.lock().testbed_status = Some(next.clone());
        Ok(())
    }

    async fn save_experiment_stats(&self, stats: &ExperimentStats) -> Result<(), StoreError> {
        self.inner.lock().stats.insert(stats.id, stats.clone());
        Ok(())
    }

    async fn find_experiment_stats(&self, id: ExperimentId) -> Result<Option<ExperimentStats>, StoreError> {
        Ok(self.inner.lock().stats.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shp_core::model::Experiment;
    use chrono::Utc;

    #[tokio::test]
    async fn next_scheduled_returns_oldest_first() {
        let store = InMemoryStore::new();
        let user = User::builder().email("a@test.com").build();
        store.insert_user(&user).await.unwrap();

        let now = Utc::now();
        let mut older = WebExperiment::submit("a@test.com", Experiment::builder().build(), now);
        older.request_schedule(now - chrono::Duration::minutes(5)).unwrap();
        let mut newer = WebExperiment::submit("a@test.com", Experiment::builder().build(), now);
        newer.request_schedule(now).unwrap();

        store.insert_experiment(&newer).await.unwrap();
        store.insert_experiment(&older).await.unwrap();

        let next = store.next_scheduled(false).await.unwrap().unwrap();
        assert_eq!(next.id, older.id);
    }

    #[tokio::test]
    async fn only_elevated_filters_by_role() {
        let store = InMemoryStore::new();
        let plain = User::builder().email("plain@test.com").build();
        let admin = User::builder().email("admin@test.com").role(UserRole::Admin).build();
        store.insert_user(&plain).await.unwrap();
        store.insert_user(&admin).await.unwrap();

        let now = Utc::now();
        let mut xp_plain = WebExperiment::submit("plain@test.com", Experiment::builder().build(), now);
        xp_plain.request_schedule(now).unwrap();
        store.insert_experiment(&xp_plain).await.unwrap();

        assert!(store.next_scheduled(true).await.unwrap().is_none());

        let mut xp_admin = WebExperiment::submit("admin@test.com", Experiment::builder().build(), now);
        xp_admin.request_schedule(now).unwrap();
        store.insert_experiment(&xp_admin).await.unwrap();

        assert_eq!(store.next_scheduled(true).await.unwrap().unwrap().id, xp_admin.id);
    }

    #[tokio::test]
    async fn rename_user_cascades_onto_owned_experiments() {
        let store = InMemoryStore::new();
        let user = User::builder().email("old@test.com").build();
        store.insert_user(&user).await.unwrap();
        let xp = WebExperiment::submit("old@test.com", Experiment::builder().build(), Utc::now());
        store.insert_experiment(&xp).await.unwrap();

        store.rename_user("old@test.com", "new@test.com").await.unwrap();

        assert!(store.find_user_by_email("old@test.com").await.unwrap().is_none());
        assert_eq!(store.find_user_by_email("new@test.com").await.unwrap().unwrap().email, "new@test.com");
        assert_eq!(store.find_experiment(xp.id).await.unwrap().unwrap().owner_email, "new@test.com");
    }

    #[tokio::test]
    async fn rename_user_rejects_taken_email() {
        let store = InMemoryStore::new();
        store.insert_user(&User::builder().email("a@test.com").build()).await.unwrap();
        store.insert_user(&User::builder().email("b@test.com").build()).await.unwrap();
        assert!(matches!(store.rename_user("a@test.com", "b@test.com").await, Err(StoreError::EmailTaken(_))));
    }

    #[tokio::test]
    async fn request_schedule_experiment_rejects_outside_created_state() {
        let store = InMemoryStore::new();
        let mut xp = WebExperiment::submit("a@test.com", Experiment::builder().build(), Utc::now());
        xp.request_schedule(Utc::now()).unwrap();
        store.insert_experiment(&xp).await.unwrap();

        let err = store.request_schedule_experiment(xp.id, Utc::now()).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition(_)));
        assert_eq!(store.find_experiment(xp.id).await.unwrap().unwrap().requested_execution_at, xp.requested_execution_at);
    }

    #[tokio::test]
    async fn storage_used_sums_result_size() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let mut xp1 = WebExperiment::submit("a@test.com", Experiment::builder().build(), now);
        xp1.result_size = 100;
        let mut xp2 = WebExperiment::submit("a@test.com", Experiment::builder().build(), now);
        xp2.result_size = 250;
        store.insert_experiment(&xp1).await.unwrap();
        store.insert_experiment(&xp2).await.unwrap();
        assert_eq!(store.storage_used_by("a@test.com").await.unwrap(), 350);
    }
}
