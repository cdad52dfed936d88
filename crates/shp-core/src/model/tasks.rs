// SPDX-License-Identifier: MIT

//! `TestbedTasks` — the descriptor the Herd driver actually pushes to
//! observers, derived from an [`Experiment`] and the set of observers
//! addressed to perform it.

use super::experiment::{Experiment, TargetConfig};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One observer's task within a `TestbedTasks` descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverTask {
    pub hostname: String,
    pub target: TargetConfig,
    /// `None` during the preparation phase; set for the real emulation run.
    pub time_start: Option<DateTime<Utc>>,
    /// Preparation tasks strip the emulation phase; only target programming
    /// runs.
    pub emulate: bool,
}

/// Descriptor pushed by the Herd driver to every addressed observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestbedTasks {
    pub experiment_name: String,
    pub duration: chrono::Duration,
    pub observer_tasks: Vec<ObserverTask>,
}

impl TestbedTasks {
    /// Phase-2 "Prepare": only programs targets, no emulation, no
    /// synchronized start.
    pub fn prepare_from(experiment: &Experiment, hostnames: &[(String, TargetConfig)]) -> Self {
        Self {
            experiment_name: experiment.name.clone(),
            duration: experiment.duration,
            observer_tasks: hostnames
                .iter()
                .map(|(hostname, target)| ObserverTask {
                    hostname: hostname.clone(),
                    target: target.clone(),
                    time_start: None,
                    emulate: false,
                })
                .collect(),
        }
    }

    /// Phase-3 "Execute": the real emulation run, synchronized to start at
    /// `time_start` across every addressed observer.
    pub fn execute_from(
        experiment: &Experiment,
        hostnames: &[(String, TargetConfig)],
        time_start: DateTime<Utc>,
    ) -> Self {
        Self {
            experiment_name: experiment.name.clone(),
            duration: experiment.duration,
            observer_tasks: hostnames
                .iter()
                .map(|(hostname, target)| ObserverTask {
                    hostname: hostname.clone(),
                    target: target.clone(),
                    time_start: Some(time_start),
                    emulate: true,
                })
                .collect(),
        }
    }

    pub fn hostnames(&self) -> Vec<String> {
        self.observer_tasks.iter().map(|t| t.hostname.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> TargetConfig {
        TargetConfig { target_id: 1, energy_environment: "eenv".into(), firmware1: None, firmware2: None, tracing: false }
    }

    #[test]
    fn prepare_strips_emulation() {
        let xp = Experiment::builder().build();
        let tasks = TestbedTasks::prepare_from(&xp, &[("obs1".to_string(), target())]);
        assert!(!tasks.observer_tasks[0].emulate);
        assert!(tasks.observer_tasks[0].time_start.is_none());
    }

    #[test]
    fn execute_sets_synchronized_start() {
        let xp = Experiment::builder().build();
        let now = Utc::now();
        let tasks = TestbedTasks::execute_from(&xp, &[("obs1".to_string(), target())], now);
        assert!(tasks.observer_tasks[0].emulate);
        assert_eq!(tasks.observer_tasks[0].time_start, Some(now));
    }
}
