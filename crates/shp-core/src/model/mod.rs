// SPDX-License-Identifier: MIT

//! The data model (spec §3): users, declarative experiments, the persisted
//! experiment record and its derived lifecycle state, testbed status, and
//! long-term accounting stats.

pub mod experiment;
pub mod stats;
pub mod tasks;
pub mod testbed;
pub mod user;
pub mod web_experiment;

pub use experiment::{Experiment, TargetConfig};
pub use stats::ExperimentStats;
pub use tasks::{ObserverTask, TestbedTasks};
pub use testbed::{ApiStatus, RedirectStatus, SchedulerStatus, TestbedStatus};
pub use user::{User, UserQuota, UserRole};
pub use web_experiment::{ExperimentState, ObserverReply, WebExperiment};
