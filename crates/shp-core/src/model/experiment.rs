// SPDX-License-Identifier: MIT

//! The declarative part of an experiment: what a user submits.
//!
//! Opaque to the scheduler beyond `duration` and the observer set derived
//! from `target_configs`; tracing/firmware/energy-environment contents are
//! passed through to the Herd driver untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One target board's configuration within an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub target_id: u32,
    pub energy_environment: String,
    pub firmware1: Option<PathBuf>,
    pub firmware2: Option<PathBuf>,
    #[serde(default)]
    pub tracing: bool,
}

/// User-supplied, declarative description of what to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub name: String,
    pub duration: chrono::Duration,

    /// Must be unset at submission time; the scheduler alone sets this,
    /// at execution, to the synchronized start instant.
    #[serde(default)]
    pub time_start: Option<DateTime<Utc>>,

    pub target_configs: Vec<TargetConfig>,

    #[serde(default)]
    pub email_results: bool,
}

impl Experiment {
    /// The set of observer (target) ids this experiment addresses.
    pub fn target_ids(&self) -> Vec<u32> {
        self.target_configs.iter().map(|t| t.target_id).collect()
    }
}

crate::builder! {
    pub struct ExperimentBuilder => Experiment {
        into {
            name: String = "test-experiment",
        }
        set {
            duration: chrono::Duration = chrono::Duration::seconds(30),
            target_configs: Vec<TargetConfig> = vec![TargetConfig {
                target_id: 1,
                energy_environment: "eenv_default".to_string(),
                firmware1: None,
                firmware2: None,
                tracing: false,
            }],
            email_results: bool = false,
        }
        option {
            time_start: DateTime<Utc> = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_ids_follow_config_order() {
        let xp = Experiment::builder()
            .target_configs(vec![
                TargetConfig { target_id: 3, energy_environment: "a".into(), firmware1: None, firmware2: None, tracing: false },
                TargetConfig { target_id: 7, energy_environment: "b".into(), firmware1: None, firmware2: None, tracing: false },
            ])
            .build();
        assert_eq!(xp.target_ids(), vec![3, 7]);
    }
}
