// SPDX-License-Identifier: MIT

//! Process-wide testbed status, a single document mutated by disjoint
//! fields from both the Scheduler and the API processes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub activated: Option<DateTime<Utc>>,
    pub busy: bool,
    pub dry_run: bool,
    pub last_update: Option<DateTime<Utc>>,
    pub observers_online: Vec<String>,
    pub observers_offline: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedirectStatus {
    pub activated: Option<DateTime<Utc>>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiStatus {
    pub activated: Option<DateTime<Utc>>,
}

/// The single shared testbed status document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestbedStatus {
    pub restrictions: Vec<String>,
    pub webapi: ApiStatus,
    pub scheduler: SchedulerStatus,
    pub redirect: RedirectStatus,
}

impl TestbedStatus {
    /// Scheduler-side field-disjoint update, applied each tick before
    /// candidate selection (§4.6).
    pub fn refresh_scheduler(
        &mut self,
        now: DateTime<Utc>,
        busy: bool,
        dry_run: bool,
        observers_online: Vec<String>,
        observers_offline: Vec<String>,
    ) {
        self.scheduler.last_update = Some(now);
        self.scheduler.busy = busy;
        self.scheduler.dry_run = dry_run;
        self.scheduler.observers_online = observers_online;
        self.scheduler.observers_offline = observers_offline;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_scheduler_touches_only_scheduler_fields() {
        let mut status = TestbedStatus {
            restrictions: vec!["maintenance".into()],
            ..Default::default()
        };
        status.refresh_scheduler(Utc::now(), true, false, vec!["a".into()], vec![]);
        assert_eq!(status.restrictions, vec!["maintenance".to_string()]);
        assert!(status.scheduler.busy);
    }
}
