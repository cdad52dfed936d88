// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! C2 Herd driver: the abstract connection to the observer fleet, an
//! SSH-backed implementation, and a temporary-directory mock for tests and
//! staging (§9).

pub mod async_wrap;
pub mod dryrun;
pub mod error;
pub mod herd;
pub mod real;

pub use async_wrap::with_timeout;
pub use dryrun::DryRunHerd;
pub use error::HerdError;
pub use herd::{Herd, TaskReply};
pub use real::RealHerd;

/// Operator-tunable per-phase outer timeouts (spec §4.5 current values).
pub mod timeouts {
    use std::time::Duration;

    pub const CLEANUP: Duration = Duration::from_secs(60);
    pub const PREPARE: Duration = Duration::from_secs(5 * 60);
    pub const SCHEDULE: Duration = Duration::from_secs(30);
    pub const FETCH_LOGS: Duration = Duration::from_secs(30);
    pub const FETCH_SCHEDULER_LOG: Duration = Duration::from_secs(10);
    pub const REBOOT: Duration = Duration::from_secs(200);

    /// `duration + 10 min`, the "wait for completion" outer timeout.
    pub fn wait_completion(experiment_duration: chrono::Duration) -> Duration {
        let secs = experiment_duration.num_seconds().max(0) as u64 + 10 * 60;
        Duration::from_secs(secs)
    }
}
