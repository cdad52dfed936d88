// SPDX-License-Identifier: MIT

//! §4.8 Pruning: an operator-triggered sweep that unions three disjoint
//! candidate sets and retires each one behind an ExperimentStats twin.

use std::collections::BTreeMap;

use shp_core::id::ExperimentId;
use shp_core::model::ExperimentStats;
use shp_core::{Clock, QuotaEngine};
use shp_store::Store;
use tracing::info;

use crate::error::SchedulerError;

#[derive(Debug, Clone)]
pub struct PruneConfig {
    /// Candidate set (a): every experiment of a user inactive longer than this.
    pub age_max_user: chrono::Duration,
    /// Floor below candidate set (b): never prune an experiment younger than this.
    pub age_min_experiment: chrono::Duration,
    /// Candidate set (c): every experiment older than this, regardless of owner.
    pub age_max_experiment: chrono::Duration,
    /// Report what would be freed without deleting anything.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PruneReport {
    pub pruned: Vec<ExperimentId>,
    pub freed_bytes: i64,
}

/// Runs one pruning sweep. Idempotent: a record already gone from the Store
/// simply doesn't appear in any candidate set on the next pass.
pub async fn prune(
    store: &dyn Store,
    quota: &QuotaEngine<'_>,
    clock: &impl Clock,
    config: &PruneConfig,
) -> Result<PruneReport, SchedulerError> {
    let now = clock.now();
    let users = store.find_all_users().await?;

    let mut candidates = BTreeMap::new();

    // (a) every experiment of a user inactive longer than age_max_user.
    for user in &users {
        if now - user.last_active_at > config.age_max_user {
            for xp in store.find_experiments_by_owner(&user.email).await? {
                candidates.insert(xp.id, xp);
            }
        }
    }

    // (b) for every user over their storage quota, their oldest experiments
    // (never touching anything younger than age_min_experiment) until back
    // under quota.
    for user in &users {
        let used = store.storage_used_by(&user.email).await?;
        let allowed = quota.effective_storage(user, now);
        if used <= allowed {
            continue;
        }
        let mut owned = store.find_experiments_by_owner(&user.email).await?;
        owned.sort_by_key(|xp| xp.created_at);
        let mut freed = 0i64;
        for xp in owned {
            if now - xp.created_at < config.age_min_experiment {
                continue;
            }
            if used - freed <= allowed {
                break;
            }
            freed += xp.result_size;
            candidates.insert(xp.id, xp);
        }
    }

    // (c) every experiment older than age_max_experiment, regardless of owner.
    for xp in store.find_all_experiments().await? {
        if now - xp.created_at > config.age_max_experiment {
            candidates.insert(xp.id, xp);
        }
    }

    let mut report = PruneReport::default();
    for (id, xp) in candidates {
        report.freed_bytes += xp.result_size;
        report.pruned.push(id);
        if config.dry_run {
            continue;
        }

        let mut stats = store.find_experiment_stats(id).await?.unwrap_or_else(|| ExperimentStats::derive_from(&xp));
        stats.update_with(&xp, now, true);
        store.save_experiment_stats(&stats).await?;

        for path in xp.content_paths.values().chain(xp.result_paths.values()) {
            if let Err(err) = std::fs::remove_file(path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    info!(path = %path.display(), error = %err, "could not remove content file during prune");
                }
            }
        }
        store.delete_experiment(id).await?;
    }

    if config.dry_run {
        info!(count = report.pruned.len(), freed_bytes = report.freed_bytes, "prune dry-run would free");
    } else {
        info!(count = report.pruned.len(), freed_bytes = report.freed_bytes, "pruned experiments");
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use shp_core::model::{Experiment, User, WebExperiment};
    use shp_core::{FakeClock, QuotaDefaults};
    use shp_store::InMemoryStore;

    fn defaults() -> QuotaDefaults {
        QuotaDefaults { duration: Duration::hours(1), storage_bytes: 1_000, experiment_root: "/var/shepherd/experiments".into() }
    }

    fn config() -> PruneConfig {
        PruneConfig {
            age_max_user: Duration::days(365),
            age_min_experiment: Duration::zero(),
            age_max_experiment: Duration::days(90),
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn prunes_experiments_older_than_max_age() {
        let store = InMemoryStore::new();
        let clock = FakeClock::new(Utc::now());
        let user = User::builder().build();
        store.insert_user(&user).await.unwrap();

        let old_time = clock.now() - Duration::days(200);
        let mut xp = WebExperiment::submit("user@test.com", Experiment::builder().build(), old_time);
        xp.result_size = 42;
        store.insert_experiment(&xp).await.unwrap();

        let defaults = defaults();
        let quota = QuotaEngine::new(&defaults);
        let report = prune(&store, &quota, &clock, &config()).await.unwrap();

        assert_eq!(report.pruned, vec![xp.id]);
        assert_eq!(report.freed_bytes, 42);
        assert!(store.find_experiment(xp.id).await.unwrap().is_none());
        let stats = store.find_experiment_stats(xp.id).await.unwrap().unwrap();
        assert!(stats.deleted_at.is_some());
    }

    #[tokio::test]
    async fn dry_run_reports_without_deleting() {
        let store = InMemoryStore::new();
        let clock = FakeClock::new(Utc::now());
        store.insert_user(&User::builder().build()).await.unwrap();

        let old_time = clock.now() - Duration::days(200);
        let xp = WebExperiment::submit("user@test.com", Experiment::builder().build(), old_time);
        store.insert_experiment(&xp).await.unwrap();

        let defaults = defaults();
        let quota = QuotaEngine::new(&defaults);
        let mut cfg = config();
        cfg.dry_run = true;
        let report = prune(&store, &quota, &clock, &cfg).await.unwrap();

        assert_eq!(report.pruned, vec![xp.id]);
        assert!(store.find_experiment(xp.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn recent_experiment_of_active_user_is_untouched() {
        let store = InMemoryStore::new();
        let clock = FakeClock::new(Utc::now());
        store.insert_user(&User::builder().build()).await.unwrap();

        let xp = WebExperiment::submit("user@test.com", Experiment::builder().build(), clock.now());
        store.insert_experiment(&xp).await.unwrap();

        let defaults = defaults();
        let quota = QuotaEngine::new(&defaults);
        let report = prune(&store, &quota, &clock, &config()).await.unwrap();

        assert!(report.pruned.is_empty());
    }
}
