// SPDX-License-Identifier: MIT

//! Scheduler-owned configuration, resolved once at startup and passed in
//! explicitly (spec §9: never a module-level global).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sleep between polls when no candidate is ready (20 s).
    pub wait_delay: Duration,
    /// Drain the queue to admin/elevated users only (operator incident flag).
    pub only_elevated: bool,
    /// Whether the injected [`shp_herd::Herd`] is a `DryRunHerd`. Only drives
    /// `TestbedStatus.scheduler.dry_run` and the mocked execute-phase sleep;
    /// the control flow below is identical for both Herd implementations.
    pub dry_run: bool,
    /// Server-side root experiment artifacts are confined to.
    pub experiment_root: PathBuf,
    /// Synchronization budget added to the real emulation start (60 s).
    pub sync_budget: chrono::Duration,
    /// I/O-settle sleep before the collection phase (30 s).
    pub collect_settle: Duration,
    /// Simulated experiment length under dry-run mode (10 s in the original).
    pub dry_run_duration: Duration,
    /// Target-id to observer-hostname assignment, resolved once at startup.
    pub observer_map: BTreeMap<u32, String>,
    /// systemd unit the scheduler itself runs under, queried via `journalctl`
    /// for the Collect phase's journal excerpt (§4.4 step 4).
    pub scheduler_unit: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wait_delay: Duration::from_secs(20),
            only_elevated: false,
            dry_run: false,
            experiment_root: PathBuf::from("/var/shepherd/experiments"),
            sync_budget: chrono::Duration::seconds(60),
            collect_settle: Duration::from_secs(30),
            dry_run_duration: Duration::from_secs(10),
            observer_map: BTreeMap::from([(1, "unit_testing_sheep".to_string())]),
            scheduler_unit: "shepherd-scheduler.service".to_string(),
        }
    }
}
