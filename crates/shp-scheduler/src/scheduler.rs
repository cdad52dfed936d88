// SPDX-License-Identifier: MIT

//! C5 Scheduler: the single logical writer that drains `requested_execution_at`
//! candidates through the five-phase Claim → Prepare → Execute → Collect →
//! Finalize protocol (§4.4) and drives the Herd fleet and Notifier around it.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use shp_core::model::{Experiment, ExperimentStats, TargetConfig, TestbedTasks, WebExperiment};
use shp_core::Clock;
use shp_herd::{timeouts, with_timeout, Herd};
use shp_notify::Notifier;
use shp_store::Store;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::status;

pub struct Scheduler<C: Clock> {
    store: Arc<dyn Store>,
    herd: Arc<dyn Herd>,
    notifier: Notifier,
    clock: C,
    config: SchedulerConfig,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(store: Arc<dyn Store>, herd: Arc<dyn Herd>, notifier: Notifier, clock: C, config: SchedulerConfig) -> Self {
        Self { store, herd, notifier, clock, config }
    }

    /// The outer control loop (§4.4). `shutdown` resolves on an OS-level exit
    /// signal; it is only observed at the `wait_delay` suspension point,
    /// matching the "no record is mutated in place during shutdown" rule.
    pub async fn run(&self, mut shutdown: impl Future<Output = ()> + Unpin) -> Result<(), SchedulerError> {
        status::mark_activated(self.store.as_ref(), &self.clock).await?;
        self.herd.open().await?;
        self.cleanup().await;
        self.reset_stuck_items().await?;

        loop {
            let loop_start = self.clock.now();
            self.update_status().await?;

            let candidate = self.store.next_scheduled(self.config.only_elevated).await?;
            let Some(candidate) = candidate else {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.wait_delay) => continue,
                    _ = &mut shutdown => {
                        status::mark_deactivated(self.store.as_ref()).await?;
                        return Ok(());
                    }
                }
            };

            info!(experiment = %candidate.id, name = %candidate.experiment.name, "scheduling experiment");
            let had_error = self.run_web_experiment(candidate, loop_start).await?;
            if had_error {
                warn!("experiment run had errors, rebooting herd and exiting for supervisor restart");
                self.reboot().await;
                return Ok(());
            }
        }
    }

    /// The five-phase protocol for one claimed candidate. Returns whether
    /// the run `had_error` per §4.4 step 5's composite formula.
    async fn run_web_experiment(&self, candidate: WebExperiment, loop_start: DateTime<Utc>) -> Result<bool, SchedulerError> {
        let observer_targets = self.observer_targets(&candidate.experiment);
        let requested: Vec<String> = observer_targets.iter().map(|(hostname, _)| hostname.clone()).collect();

        // --- 1. Claim ---
        let mut prev = candidate;
        let mut xp = prev.clone();
        xp.claim(self.clock.now(), requested.clone())?;
        self.store.save_experiment_changes(&prev, &xp).await?;
        prev = xp.clone();

        let online = self.herd.online_set().await.unwrap_or_default();
        xp.observers_online = requested.iter().filter(|h| online.contains(*h)).cloned().collect();
        xp.observers_offline = requested.iter().filter(|h| !online.contains(*h)).cloned().collect();
        let addressed: Vec<(String, TargetConfig)> =
            observer_targets.iter().filter(|(h, _)| online.contains(h)).cloned().collect();
        let addressed_hostnames: Vec<String> = addressed.iter().map(|(h, _)| h.clone()).collect();

        // --- 2. Prepare ---
        let prep_tasks = TestbedTasks::prepare_from(&xp.experiment, &addressed);
        let herd = Arc::clone(&self.herd);
        let poll_hostnames = addressed_hostnames.clone();
        let (_, prep_err) = with_timeout(timeouts::PREPARE, "preparation", async move {
            herd.run_task(&prep_tasks).await?;
            poll_until_inactive(herd.as_ref(), &poll_hostnames).await
        })
        .await;

        // --- 3. Execute ---
        let herd = Arc::clone(&self.herd);
        let (consensus, ts_err) = with_timeout(timeouts::SCHEDULE, "fetch timestamp", async move { herd.find_consensus_time().await }).await;
        let ts_herd = consensus.map(|(start, _delay)| start).unwrap_or_else(|| self.clock.now());

        let (exec_err, executed) = if prep_err.is_some() {
            (prep_err.clone(), false)
        } else {
            let time_start = self.clock.now() + self.config.sync_budget;
            xp.mark_executed(time_start);
            let exec_tasks = TestbedTasks::execute_from(&xp.experiment, &addressed, time_start);
            let herd = Arc::clone(&self.herd);
            let (_, push_err) = with_timeout(timeouts::SCHEDULE, "schedule-emulation", async move { herd.run_task(&exec_tasks).await }).await;

            if self.config.dry_run {
                tokio::time::sleep(self.config.dry_run_duration).await;
            }
            let duration = xp.experiment.duration;
            let herd = Arc::clone(&self.herd);
            let poll_hostnames = addressed_hostnames.clone();
            let (_, wait_err) = with_timeout(timeouts::wait_completion(duration), "execution", async move {
                poll_until_inactive(herd.as_ref(), &poll_hostnames).await
            })
            .await;
            (ts_err.or(push_err).or(wait_err), true)
        };

        // --- 4. Collect ---
        tokio::time::sleep(self.config.collect_settle).await;
        let herd = Arc::clone(&self.herd);
        let log_hostnames = addressed_hostnames.clone();
        let (logs, logs_err) =
            with_timeout(timeouts::FETCH_LOGS, "log collection", async move { herd.service_get_logs(&log_hostnames, ts_herd).await }).await;
        if let Some(logs) = logs {
            for (hostname, reply) in logs {
                xp.observers_output.insert(
                    hostname,
                    shp_core::model::ObserverReply { exited: reply.exited, stdout: reply.stdout, stderr: reply.stderr },
                );
            }
        }

        let herd = Arc::clone(&self.herd);
        let result_hostnames = addressed_hostnames.clone();
        let (raw_paths, _) =
            with_timeout(timeouts::FETCH_LOGS, "fetch result paths", async move { herd.result_paths(&result_hostnames).await }).await;
        // "drop + log" rule (§9 Open Questions): an observer is dropped from
        // the result set when its result file cannot be staged under the
        // server-side experiment root, mirroring the original's server-path
        // existence check rather than the raw observer-reported path.
        let mut result_size = 0i64;
        if let Some(raw_paths) = raw_paths {
            for hostname in &addressed_hostnames {
                match raw_paths.get(hostname) {
                    Some(raw_path) => {
                        let file_name = raw_path.file_name().unwrap_or(std::ffi::OsStr::new("result"));
                        let observer_root = self.config.experiment_root.join(hostname);
                        let canonical = observer_root.join(file_name);
                        let staged = std::fs::create_dir_all(&observer_root).and_then(|_| std::fs::copy(raw_path, &canonical));
                        match staged {
                            Ok(size) => {
                                result_size += size as i64;
                                xp.observers_had_data.insert(hostname.clone(), true);
                                xp.result_paths.insert(hostname.clone(), canonical.clone());
                                xp.content_paths.insert(hostname.clone(), canonical);
                            }
                            Err(err) => {
                                warn!(observer = %hostname, experiment = %xp.id, error = %err, "dropping observer: result file could not be staged under experiment root");
                                xp.observers_had_data.insert(hostname.clone(), false);
                            }
                        }
                    }
                    None => {
                        warn!(observer = %hostname, experiment = %xp.id, "dropping observer with no reported result path");
                        xp.observers_had_data.insert(hostname.clone(), false);
                    }
                }
            }
        }
        xp.result_size = result_size;

        let (journal, journal_err) =
            with_timeout(timeouts::FETCH_SCHEDULER_LOG, "fetch scheduler log", self.fetch_scheduler_log(loop_start)).await;

        // --- 5. Finalize ---
        let scheduler_error = prep_err.or(if executed { exec_err } else { None }).or(logs_err);
        let log = journal.unwrap_or_else(|| {
            format!("scheduler journal unavailable: {}\n", journal_err.unwrap_or_else(|| "unknown error".to_string()))
        });
        xp.finish(self.clock.now(), scheduler_error, log);
        self.store.save_experiment_changes(&prev, &xp).await?;

        let owner = self.store.find_user_by_email(&xp.owner_email).await?;
        let queue_now_empty = !self.store.has_scheduled_by_user(&xp.owner_email).await?;
        if let Err(err) = self.notifier.notify_completion(&xp, owner.as_ref().map(|u| u.email.as_str()), queue_now_empty).await {
            error!(error = %err, experiment = %xp.id, "failed to send completion notification");
        }

        let stats = ExperimentStats::derive_from(&xp);
        self.store.save_experiment_stats(&stats).await?;

        Ok(xp.had_errors())
    }

    /// The scheduler's own journal since `since`, for the `scheduler_log`
    /// attached to a finished run (§4.4 step 4). The scheduler runs as a
    /// systemd unit itself, so this is a local `journalctl` call rather than
    /// an SSH round-trip to an observer.
    async fn fetch_scheduler_log(&self, since: DateTime<Utc>) -> Result<String, std::io::Error> {
        let output = tokio::process::Command::new("journalctl")
            .args([
                "--no-pager",
                "--output=short-iso-precise",
                "--since",
                &since.to_rfc3339(),
                "-u",
                &self.config.scheduler_unit,
            ])
            .output()
            .await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// On startup, re-queue any record left `started_at ≠ ∅ ∧ finished_at = ∅
    /// ∧ scheduler_error = ∅` by a scheduler that died mid-run.
    async fn reset_stuck_items(&self) -> Result<(), SchedulerError> {
        for prev in self.store.find_all_experiments().await? {
            if prev.started_at.is_some() && prev.finished_at.is_none() && prev.scheduler_error.is_none() {
                let mut next = prev.clone();
                next.started_at = None;
                next.observers_requested.clear();
                self.store.save_experiment_changes(&prev, &next).await?;
            }
        }
        Ok(())
    }

    async fn update_status(&self) -> Result<(), SchedulerError> {
        let online = self.herd.online_set().await.unwrap_or_default();
        let known: BTreeSet<String> = self.herd.inventorize().await.unwrap_or_default().into_keys().collect();
        let busy = self.store.next_scheduled(self.config.only_elevated).await?.is_some();
        status::refresh(self.store.as_ref(), &self.clock, busy, self.config.dry_run, &online, &known).await
    }

    /// Initial herd cleanup (§4.5): kill lingering sheep processes, wait for
    /// the service to settle, erase stale per-node logs.
    async fn cleanup(&self) {
        let herd = Arc::clone(&self.herd);
        let (_, err) = with_timeout(timeouts::CLEANUP, "cleanup", async move {
            let online: Vec<String> = herd.online_set().await?.into_iter().collect();
            herd.kill_sheep_process(&online).await?;
            poll_until_inactive(herd.as_ref(), &online).await?;
            herd.service_erase_log(&online).await
        })
        .await;
        if let Some(err) = err {
            warn!(error = %err, "initial herd cleanup did not complete cleanly");
        }
    }

    /// Reboot semantics (§4.5): capture the online set, reboot all, re-open,
    /// re-sample, and mail the operator a before/after comparison.
    async fn reboot(&self) {
        let before: Vec<String> = self.herd.online_set().await.unwrap_or_default().into_iter().collect();
        let herd = Arc::clone(&self.herd);
        let hostnames = before.clone();
        let (_, err) = with_timeout(timeouts::REBOOT, "reboot", async move {
            herd.reboot(&hostnames).await?;
            tokio::time::sleep(std::time::Duration::from_secs(120)).await;
            herd.open().await
        })
        .await;
        if let Some(err) = err {
            error!(error = %err, "herd reboot did not complete cleanly");
        }
        let after: Vec<String> = self.herd.online_set().await.unwrap_or_default().into_iter().collect();
        if let Err(err) = self.notifier.notify_herd_rebooted(&before, &after).await {
            error!(error = %err, "failed to send herd-rebooted notice");
        }
    }

    fn observer_targets(&self, experiment: &Experiment) -> Vec<(String, TargetConfig)> {
        experiment
            .target_configs
            .iter()
            .map(|target| {
                let hostname = self
                    .config
                    .observer_map
                    .get(&target.target_id)
                    .cloned()
                    .unwrap_or_else(|| format!("observer-{}", target.target_id));
                (hostname, target.clone())
            })
            .collect()
    }
}

/// Block-poll `service_is_active` until every addressed hostname reports
/// inactive (the remote task finished, one way or another).
async fn poll_until_inactive(herd: &dyn Herd, hostnames: &[String]) -> Result<(), shp_herd::HerdError> {
    loop {
        let active = herd.service_is_active(hostnames).await?;
        if active.values().all(|a| !a) {
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use shp_core::{model::Experiment, FakeClock};
    use shp_herd::DryRunHerd;
    use shp_notify::FakeNotifyAdapter;
    use shp_store::InMemoryStore;

    fn notifier() -> (Notifier, Arc<FakeNotifyAdapter>) {
        let fake = Arc::new(FakeNotifyAdapter::new());
        (Notifier::new(fake.clone(), "admin@test.com"), fake)
    }

    #[tokio::test]
    async fn happy_path_dry_run_finishes_and_notifies_owner() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let herd: Arc<dyn Herd> = Arc::new(DryRunHerd::new(vec!["unit_testing_sheep".to_string()]).unwrap());
        let (notifier, fake_mail) = notifier();
        let clock = FakeClock::new(Utc::now());

        store.insert_user(&shp_core::model::User::builder().build()).await.unwrap();
        let mut xp = WebExperiment::submit("user@test.com", Experiment::builder().build(), clock.now());
        xp.request_schedule(clock.now()).unwrap();
        store.insert_experiment(&xp).await.unwrap();

        let experiment_root = tempfile::tempdir().unwrap();
        let mut config = SchedulerConfig {
            dry_run: true,
            dry_run_duration: std::time::Duration::from_millis(1),
            experiment_root: experiment_root.path().to_path_buf(),
            ..SchedulerConfig::default()
        };
        config.collect_settle = std::time::Duration::from_millis(1);
        let loop_start = clock.now();
        let scheduler = Scheduler::new(store.clone(), herd, notifier, clock, config);

        let had_error = scheduler.run_web_experiment(xp, loop_start).await.unwrap();
        assert!(!had_error);
        assert_eq!(fake_mail.sent().len(), 1);
        assert_eq!(fake_mail.sent()[0].to, vec!["user@test.com".to_string()]);
        assert!(experiment_root.path().join("unit_testing_sheep").join("result.h5").exists());
    }

    #[tokio::test]
    async fn missing_online_observer_marks_had_errors() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let herd: Arc<dyn Herd> = Arc::new(DryRunHerd::new(Vec::new()).unwrap());
        let (notifier, fake_mail) = notifier();
        let clock = FakeClock::new(Utc::now());

        let mut xp = WebExperiment::submit("user@test.com", Experiment::builder().build(), clock.now());
        xp.request_schedule(clock.now()).unwrap();

        let mut config = SchedulerConfig::default();
        config.collect_settle = std::time::Duration::from_millis(1);
        let loop_start = clock.now();
        let scheduler = Scheduler::new(store, herd, notifier, clock, config);

        let had_error = scheduler.run_web_experiment(xp, loop_start).await.unwrap();
        assert!(had_error);
        assert_eq!(fake_mail.sent()[0].to, vec!["admin@test.com".to_string()]);
    }

    #[tokio::test]
    async fn reset_stuck_items_clears_started_at_with_no_scheduler_error() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let herd: Arc<dyn Herd> = Arc::new(DryRunHerd::new(Vec::new()).unwrap());
        let (notifier, _mail) = notifier();
        let clock = FakeClock::new(Utc::now());

        let mut xp = WebExperiment::submit("user@test.com", Experiment::builder().build(), clock.now());
        xp.request_schedule(clock.now()).unwrap();
        xp.claim(clock.now(), vec!["obs1".to_string()]).unwrap();
        store.insert_experiment(&xp).await.unwrap();

        let scheduler = Scheduler::new(store.clone(), herd, notifier, clock, SchedulerConfig::default());
        scheduler.reset_stuck_items().await.unwrap();

        let reloaded = store.find_experiment(xp.id).await.unwrap().unwrap();
        assert!(reloaded.started_at.is_none());
    }
}
