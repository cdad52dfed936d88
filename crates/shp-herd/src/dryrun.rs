// SPDX-License-Identifier: MIT

//! Temporary-directory backed [`Herd`] (§9: "mocked/testing mode" is a
//! compile-time-selectable implementation, not a debug switch). Every
//! addressed observer gets its own subdirectory under a process-local
//! tempdir; `run_task` synthesizes an empty result file per observer
//! instead of touching real hardware.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use shp_core::model::TestbedTasks;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tempfile::TempDir;

use crate::error::HerdError;
use crate::herd::{Herd, TaskReply};

pub struct DryRunHerd {
    root: TempDir,
    /// The full configured fleet. Nothing ever goes offline in dry-run mode,
    /// so this doubles as the online set — but `inventorize` must still read
    /// it under its own name, not `online_set`'s, to keep the two queries
    /// architecturally distinct the way `RealHerd` keeps them.
    hostnames: BTreeSet<String>,
    last_task: Mutex<Option<TestbedTasks>>,
}

impl DryRunHerd {
    pub fn new(hostnames: Vec<String>) -> Result<Self, HerdError> {
        Ok(Self {
            root: tempfile::tempdir()?,
            hostnames: hostnames.into_iter().collect(),
            last_task: Mutex::new(None),
        })
    }

    fn observer_dir(&self, hostname: &str) -> PathBuf {
        self.root.path().join(hostname)
    }
}

#[async_trait]
impl Herd for DryRunHerd {
    async fn open(&self) -> Result<(), HerdError> {
        Ok(())
    }

    async fn online_set(&self) -> Result<BTreeSet<String>, HerdError> {
        Ok(self.hostnames.clone())
    }

    async fn run_task(&self, tasks: &TestbedTasks) -> Result<i32, HerdError> {
        for task in &tasks.observer_tasks {
            let dir = self.observer_dir(&task.hostname);
            std::fs::create_dir_all(&dir)?;
            if task.emulate {
                std::fs::write(dir.join("result.h5"), [0u8; 128])?;
            }
        }
        *self.last_task.lock() = Some(tasks.clone());
        Ok(0)
    }

    /// Synthetic tasks complete synchronously inside `run_task`, so by the
    /// time a caller polls, nothing is ever still running.
    async fn service_is_active(&self, hostnames: &[String]) -> Result<BTreeMap<String, bool>, HerdError> {
        Ok(hostnames.iter().map(|h| (h.clone(), false)).collect())
    }

    async fn service_is_failed(&self, hostnames: &[String]) -> Result<BTreeMap<String, bool>, HerdError> {
        Ok(hostnames.iter().map(|h| (h.clone(), false)).collect())
    }

    async fn service_get_logs(&self, hostnames: &[String], _since: DateTime<Utc>) -> Result<BTreeMap<String, TaskReply>, HerdError> {
        Ok(hostnames
            .iter()
            .map(|h| (h.clone(), TaskReply { exited: 0, stdout: format!("dry-run log for {h}"), stderr: String::new() }))
            .collect())
    }

    async fn service_erase_log(&self, _hostnames: &[String]) -> Result<(), HerdError> {
        Ok(())
    }

    async fn find_consensus_time(&self) -> Result<(DateTime<Utc>, i64), HerdError> {
        Ok((Utc::now(), 0))
    }

    async fn kill_sheep_process(&self, _hostnames: &[String]) -> Result<(), HerdError> {
        Ok(())
    }

    async fn reboot(&self, _hostnames: &[String]) -> Result<(), HerdError> {
        Ok(())
    }

    async fn min_space_left(&self, _hostnames: &[String]) -> Result<u64, HerdError> {
        Ok(u64::MAX)
    }

    async fn resync(&self) -> Result<(), HerdError> {
        Ok(())
    }

    async fn inventorize(&self) -> Result<BTreeMap<String, String>, HerdError> {
        Ok(self.hostnames.iter().map(|h| (h.clone(), "dry-run-observer".to_string())).collect())
    }

    async fn result_paths(&self, hostnames: &[String]) -> Result<BTreeMap<String, PathBuf>, HerdError> {
        Ok(hostnames
            .iter()
            .filter(|h| self.observer_dir(h).join("result.h5").exists())
            .map(|h| (h.clone(), self.observer_dir(h).join("result.h5")))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shp_core::model::{Experiment, TestbedTasks};

    #[tokio::test]
    async fn run_task_synthesizes_result_file_per_observer() {
        let herd = DryRunHerd::new(vec!["obs1".to_string(), "obs2".to_string()]).unwrap();
        let xp = Experiment::builder().build();
        let target = xp.target_configs[0].clone();
        let tasks = TestbedTasks::execute_from(
            &xp,
            &[("obs1".to_string(), target.clone()), ("obs2".to_string(), target)],
            Utc::now(),
        );
        herd.run_task(&tasks).await.unwrap();
        let paths = herd.result_paths(&["obs1".to_string(), "obs2".to_string()]).await.unwrap();
        assert_eq!(paths.len(), 2);
    }

    #[tokio::test]
    async fn service_is_active_is_always_false_after_synchronous_completion() {
        let herd = DryRunHerd::new(vec!["obs1".to_string()]).unwrap();
        let status = herd.service_is_active(&["obs1".to_string(), "obs2".to_string()]).await.unwrap();
        assert_eq!(status.get("obs1"), Some(&false));
        assert_eq!(status.get("obs2"), Some(&false));
    }
}
