// SPDX-License-Identifier: MIT

//! C5→Status updater (spec §4.6): refreshes the shared `TestbedStatus`
//! document's scheduler-owned fields each tick, via `save_changes` so the
//! API process's disjoint writes (restrictions, webapi.activated) survive.

use std::collections::BTreeSet;

use shp_core::Clock;
use shp_store::Store;

use crate::error::SchedulerError;

pub async fn refresh(
    store: &dyn Store,
    clock: &impl Clock,
    busy: bool,
    dry_run: bool,
    online: &BTreeSet<String>,
    known_hostnames: &BTreeSet<String>,
) -> Result<(), SchedulerError> {
    let prev = store.load_testbed_status().await?;
    let mut next = prev.clone();
    let offline: Vec<String> = known_hostnames.difference(online).cloned().collect();
    next.refresh_scheduler(clock.now(), busy, dry_run, online.iter().cloned().collect(), offline);
    store.save_testbed_status_changes(&prev, &next).await?;
    Ok(())
}

pub async fn mark_activated(store: &dyn Store, clock: &impl Clock) -> Result<(), SchedulerError> {
    let prev = store.load_testbed_status().await?;
    let mut next = prev.clone();
    next.scheduler.activated = Some(clock.now());
    store.save_testbed_status_changes(&prev, &next).await?;
    Ok(())
}

pub async fn mark_deactivated(store: &dyn Store) -> Result<(), SchedulerError> {
    let prev = store.load_testbed_status().await?;
    let mut next = prev.clone();
    next.scheduler.activated = None;
    store.save_testbed_status_changes(&prev, &next).await?;
    Ok(())
}
