// SPDX-License-Identifier: MIT

//! The persisted experiment record and the lifecycle state derived from it.

use super::experiment::Experiment;
use crate::error::CoreError;
use crate::id::ExperimentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Exit status and captured output of one observer's sheep service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObserverReply {
    pub exited: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Lifecycle state, a pure function of [`WebExperiment`]'s timestamp and
/// result fields — never stored as its own column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentState {
    Created,
    Scheduled,
    Running,
    Finished,
    Failed,
}

crate::simple_display! {
    ExperimentState {
        Created => "created",
        Scheduled => "scheduled",
        Running => "running",
        Finished => "finished",
        Failed => "failed",
    }
}

/// The full persisted record wrapping a declarative [`Experiment`].
///
/// Field ownership is split per the single-writer discipline: the API may
/// only write `requested_execution_at` (via [`WebExperiment::request_schedule`])
/// before pickup; every field below that line is Scheduler-owned from the
/// moment `started_at` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebExperiment {
    pub id: ExperimentId,
    pub owner_email: String,
    pub experiment: Experiment,

    pub created_at: DateTime<Utc>,
    pub requested_execution_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,

    // Scheduler-owned from pickup onward.
    pub observers_requested: Vec<String>,
    pub observers_online: Vec<String>,
    pub observers_offline: Vec<String>,
    pub observers_output: BTreeMap<String, ObserverReply>,
    pub observers_had_data: BTreeMap<String, bool>,

    pub result_paths: BTreeMap<String, PathBuf>,
    pub content_paths: BTreeMap<String, PathBuf>,
    pub result_size: i64,

    pub scheduler_error: Option<String>,
    pub scheduler_log: Option<String>,
}

impl WebExperiment {
    /// Construct a freshly-submitted record in `created` state.
    pub fn submit(owner_email: impl Into<String>, experiment: Experiment, now: DateTime<Utc>) -> Self {
        Self {
            id: ExperimentId::new(),
            owner_email: owner_email.into(),
            experiment,
            created_at: now,
            requested_execution_at: None,
            started_at: None,
            executed_at: None,
            finished_at: None,
            observers_requested: Vec::new(),
            observers_online: Vec::new(),
            observers_offline: Vec::new(),
            observers_output: BTreeMap::new(),
            observers_had_data: BTreeMap::new(),
            result_paths: BTreeMap::new(),
            content_paths: BTreeMap::new(),
            result_size: 0,
            scheduler_error: None,
            scheduler_log: None,
        }
    }

    /// Pure derivation of lifecycle state from the record's own fields.
    pub fn state(&self) -> ExperimentState {
        match (self.finished_at, &self.result_paths, self.started_at, self.requested_execution_at) {
            (Some(_), paths, _, _) if !paths.is_empty() => ExperimentState::Finished,
            (Some(_), _, _, _) => ExperimentState::Failed,
            (None, _, Some(_), _) => ExperimentState::Running,
            (None, _, None, Some(_)) => ExperimentState::Scheduled,
            (None, _, None, None) => ExperimentState::Created,
        }
    }

    /// API-side transition: request execution. Fails outside `created` state.
    pub fn request_schedule(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        if self.state() != ExperimentState::Created {
            return Err(CoreError::NotCreatedState);
        }
        self.requested_execution_at = Some(now);
        Ok(())
    }

    /// Scheduler-side transition: claim the record (phase 1, "Claim").
    ///
    /// Callers must already have verified `state() == Scheduled` via the
    /// Store's candidate-selection query; this only enforces it locally too.
    pub fn claim(&mut self, now: DateTime<Utc>, observers_requested: Vec<String>) -> Result<(), CoreError> {
        if self.state() != ExperimentState::Scheduled {
            return Err(CoreError::InvalidTransition {
                from: self.state().to_string(),
                to: "running".to_string(),
            });
        }
        self.started_at = Some(now);
        self.observers_requested = observers_requested;
        Ok(())
    }

    /// Scheduler-side: mark phase-3 execution start ("Execute").
    pub fn mark_executed(&mut self, at: DateTime<Utc>) {
        self.executed_at = Some(at);
    }

    /// Scheduler-side: finalize the run ("Finalize").
    pub fn finish(&mut self, now: DateTime<Utc>, error: Option<String>, log: String) {
        self.finished_at = Some(now);
        self.scheduler_error = error;
        self.scheduler_log = Some(log);
    }

    /// The highest (absolute) exit code among requested observers that
    /// reported back. Missing-but-requested observers don't count here.
    pub fn max_exit_code(&self) -> i32 {
        self.observers_requested
            .iter()
            .filter_map(|obs| self.observers_output.get(obs))
            .map(|reply| reply.exited.abs())
            .max()
            .unwrap_or(0)
    }

    /// True unless every requested observer has a captured result.
    pub fn has_missing_data(&self) -> bool {
        !self
            .observers_requested
            .iter()
            .all(|obs| *self.observers_had_data.get(obs).unwrap_or(&false))
    }

    /// Requested observers that never came online for this run.
    pub fn missing_observers(&self) -> Vec<String> {
        let online: std::collections::BTreeSet<_> = self.observers_online.iter().collect();
        let mut missing: Vec<String> = self
            .observers_requested
            .iter()
            .filter(|obs| !online.contains(obs))
            .cloned()
            .collect();
        missing.sort();
        missing
    }

    /// Whether this run had any error, observer fault, or missing data.
    pub fn had_errors(&self) -> bool {
        self.max_exit_code() > 0
            || self.scheduler_error.is_some()
            || self.has_missing_data()
            || !self.missing_observers().is_empty()
    }

    /// One text blob per requested observer (stdout/stderr framing banners,
    /// matching the original transcript format) plus the scheduler log.
    pub fn terminal_output(&self, only_faulty: bool) -> Vec<(String, String)> {
        let mut files = Vec::new();
        for (hostname, reply) in &self.observers_output {
            if !self.observers_requested.iter().any(|o| o == hostname) {
                continue;
            }
            let had_error = reply.exited.abs() != 0 || !self.observers_had_data.get(hostname).copied().unwrap_or(false);
            if only_faulty && !had_error {
                continue;
            }
            let mut body = String::new();
            if !reply.stdout.is_empty() {
                body.push_str(&format!("\n************** {hostname} - stdout **************\n"));
                body.push_str(&reply.stdout);
            }
            if !reply.stderr.is_empty() {
                body.push_str(&format!("\n~~~~~~~~~~~~~~ {hostname} - stderr ~~~~~~~~~~~~~~\n"));
                body.push_str(&reply.stderr);
            }
            body.push_str(&format!("\nExit-code of {hostname} = {}\n", reply.exited));
            files.push((format!("{hostname}_error.log"), body));
        }
        if let Some(log) = &self.scheduler_log {
            files.push(("scheduler.log".to_string(), log.clone()));
        }
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WebExperiment {
        WebExperiment::submit("user@test.com", Experiment::builder().build(), Utc::now())
    }

    #[test]
    fn state_follows_derivation_rule() {
        let mut xp = sample();
        assert_eq!(xp.state(), ExperimentState::Created);

        xp.request_schedule(Utc::now()).unwrap();
        assert_eq!(xp.state(), ExperimentState::Scheduled);

        xp.claim(Utc::now(), vec!["obs1".into()]).unwrap();
        assert_eq!(xp.state(), ExperimentState::Running);

        xp.finish(Utc::now(), None, "log".into());
        assert_eq!(xp.state(), ExperimentState::Failed);

        xp.result_paths.insert("obs1".into(), "/tmp/x".into());
        assert_eq!(xp.state(), ExperimentState::Finished);
    }

    #[test]
    fn request_schedule_rejects_non_created_state() {
        let mut xp = sample();
        xp.request_schedule(Utc::now()).unwrap();
        assert!(xp.request_schedule(Utc::now()).is_err());
    }

    #[test]
    fn missing_observers_is_requested_minus_online() {
        let mut xp = sample();
        xp.observers_requested = vec!["a".into(), "b".into(), "c".into()];
        xp.observers_online = vec!["a".into(), "b".into()];
        assert_eq!(xp.missing_observers(), vec!["c".to_string()]);
        assert!(xp.had_errors());
    }

    #[test]
    fn max_exit_code_ignores_unrequested_observers() {
        let mut xp = sample();
        xp.observers_requested = vec!["a".into()];
        xp.observers_output.insert("a".into(), ObserverReply { exited: 2, stdout: String::new(), stderr: String::new() });
        xp.observers_output.insert("b".into(), ObserverReply { exited: 9, stdout: String::new(), stderr: String::new() });
        assert_eq!(xp.max_exit_code(), 2);
    }
}
