// SPDX-License-Identifier: MIT

//! C2 Herd driver contract (spec §6.3): the abstract connection to the
//! observer fleet. `RealHerd` backs this with SSH; `DryRunHerd` backs it
//! with a temporary directory so the scheduler loop can be exercised
//! without hardware (§9, "mocked/testing mode").

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shp_core::model::TestbedTasks;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::HerdError;

/// One observer's reported exit status and captured output, mirroring the
/// shape the scheduler persists onto `WebExperiment::observers_output`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskReply {
    pub exited: i32,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait Herd: Send + Sync + 'static {
    /// Establish/refresh SSH connections; populates the online subset.
    async fn open(&self) -> Result<(), HerdError>;

    /// The hostnames currently reachable, as of the last `open`/`resync`.
    async fn online_set(&self) -> Result<BTreeSet<String>, HerdError>;

    /// Push a task descriptor and start the sheep service on every
    /// addressed observer; returns the non-zero exit code of any observer
    /// that failed to start, or 0 if all started cleanly.
    async fn run_task(&self, tasks: &TestbedTasks) -> Result<i32, HerdError>;

    async fn service_is_active(&self, hostnames: &[String]) -> Result<BTreeMap<String, bool>, HerdError>;
    async fn service_is_failed(&self, hostnames: &[String]) -> Result<BTreeMap<String, bool>, HerdError>;
    async fn service_get_logs(&self, hostnames: &[String], since: DateTime<Utc>) -> Result<BTreeMap<String, TaskReply>, HerdError>;
    async fn service_erase_log(&self, hostnames: &[String]) -> Result<(), HerdError>;

    /// Returns `(start_timestamp, delay_seconds)` used to synchronize an
    /// emulation start across observers.
    async fn find_consensus_time(&self) -> Result<(DateTime<Utc>, i64), HerdError>;

    async fn kill_sheep_process(&self, hostnames: &[String]) -> Result<(), HerdError>;
    async fn reboot(&self, hostnames: &[String]) -> Result<(), HerdError>;
    async fn min_space_left(&self, hostnames: &[String]) -> Result<u64, HerdError>;
    async fn resync(&self) -> Result<(), HerdError>;
    async fn inventorize(&self) -> Result<BTreeMap<String, String>, HerdError>;

    /// Result paths the observers reported for a run, relative to the
    /// observer's own experiment root — translated to server paths by the
    /// scheduler's collection phase, never by the driver itself.
    async fn result_paths(&self, hostnames: &[String]) -> Result<BTreeMap<String, std::path::PathBuf>, HerdError>;
}
