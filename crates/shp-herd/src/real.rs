// SPDX-License-Identifier: MIT

//! SSH-backed [`Herd`] implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use openssh::{KnownHosts, Session};
use parking_lot::Mutex;
use shp_core::model::TestbedTasks;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::HerdError;
use crate::herd::{Herd, TaskReply};

const REMOTE_TASK_PATH: &str = "/etc/shepherd/herd_task.yaml";
const SHEEP_SERVICE: &str = "shepherd-sheep.service";

struct Connection {
    session: Session,
}

/// SSH-backed observer fleet. One persistent connection per configured
/// hostname, refreshed on `open`/`resync`.
pub struct RealHerd {
    hostnames: Vec<String>,
    connections: Mutex<BTreeMap<String, Arc<Connection>>>,
}

impl RealHerd {
    pub fn new(hostnames: Vec<String>) -> Self {
        Self { hostnames, connections: Mutex::new(BTreeMap::new()) }
    }

    async fn connect_one(hostname: &str) -> Result<Connection, HerdError> {
        let session = Session::connect(format!("ssh://{hostname}"), KnownHosts::Strict)
            .await
            .map_err(|source| HerdError::Connect { hostname: hostname.to_string(), source })?;
        Ok(Connection { session })
    }

    fn connection(&self, hostname: &str) -> Result<Arc<Connection>, HerdError> {
        self.connections.lock().get(hostname).cloned().ok_or(HerdError::NotOpen)
    }
}

#[async_trait]
impl Herd for RealHerd {
    async fn open(&self) -> Result<(), HerdError> {
        let mut fresh = BTreeMap::new();
        for hostname in &self.hostnames {
            match Self::connect_one(hostname).await {
                Ok(conn) => {
                    fresh.insert(hostname.clone(), Arc::new(conn));
                }
                Err(err) => {
                    tracing::warn!(hostname, error = %err, "observer unreachable during open()");
                }
            }
        }
        *self.connections.lock() = fresh;
        Ok(())
    }

    async fn online_set(&self) -> Result<BTreeSet<String>, HerdError> {
        Ok(self.connections.lock().keys().cloned().collect())
    }

    async fn run_task(&self, tasks: &TestbedTasks) -> Result<i32, HerdError> {
        let body = serde_yaml_placeholder(tasks);
        let mut max_exit = 0;
        for task in &tasks.observer_tasks {
            let conn = self.connection(&task.hostname)?;
            let exit = push_and_start(&conn.session, &task.hostname, &body).await?;
            max_exit = max_exit.max(exit);
        }
        Ok(max_exit)
    }

    async fn service_is_active(&self, hostnames: &[String]) -> Result<BTreeMap<String, bool>, HerdError> {
        let mut out = BTreeMap::new();
        for hostname in hostnames {
            let conn = self.connection(hostname)?;
            let result = conn
                .session
                .command("systemctl")
                .args(["is-active", SHEEP_SERVICE])
                .output()
                .await
                .map_err(|e| HerdError::Command(hostname.clone(), e))?;
            out.insert(hostname.clone(), result.status.success());
        }
        Ok(out)
    }

    async fn service_is_failed(&self, hostnames: &[String]) -> Result<BTreeMap<String, bool>, HerdError> {
        let mut out = BTreeMap::new();
        for hostname in hostnames {
            let conn = self.connection(hostname)?;
            let result = conn
                .session
                .command("systemctl")
                .args(["is-failed", SHEEP_SERVICE])
                .output()
                .await
                .map_err(|e| HerdError::Command(hostname.clone(), e))?;
            out.insert(hostname.clone(), result.status.success());
        }
        Ok(out)
    }

    async fn service_get_logs(&self, hostnames: &[String], since: DateTime<Utc>) -> Result<BTreeMap<String, TaskReply>, HerdError> {
        let mut out = BTreeMap::new();
        for hostname in hostnames {
            let conn = self.connection(hostname)?;
            let result = conn
                .session
                .command("journalctl")
                .args(["-u", SHEEP_SERVICE, "--since", &since.to_rfc3339(), "--no-pager"])
                .output()
                .await
                .map_err(|e| HerdError::Command(hostname.clone(), e))?;
            out.insert(
                hostname.clone(),
                TaskReply {
                    exited: result.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&result.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
                },
            );
        }
        Ok(out)
    }

    async fn service_erase_log(&self, hostnames: &[String]) -> Result<(), HerdError> {
        for hostname in hostnames {
            let conn = self.connection(hostname)?;
            conn.session
                .command("journalctl")
                .args(["--rotate", "--vacuum-time=1s", "-u", SHEEP_SERVICE])
                .status()
                .await
                .map_err(|e| HerdError::Command(hostname.clone(), e))?;
        }
        Ok(())
    }

    async fn find_consensus_time(&self) -> Result<(DateTime<Utc>, i64), HerdError> {
        // Observers are assumed PTP-synchronized; the server clock is the
        // consensus source and the synchronization budget is fixed at the
        // scheduler layer (60s), so this only reports "now".
        Ok((Utc::now(), 0))
    }

    async fn kill_sheep_process(&self, hostnames: &[String]) -> Result<(), HerdError> {
        for hostname in hostnames {
            let conn = self.connection(hostname)?;
            conn.session
                .command("systemctl")
                .args(["kill", "--signal=SIGKILL", SHEEP_SERVICE])
                .status()
                .await
                .map_err(|e| HerdError::Command(hostname.clone(), e))?;
        }
        Ok(())
    }

    async fn reboot(&self, hostnames: &[String]) -> Result<(), HerdError> {
        for hostname in hostnames {
            let conn = self.connection(hostname)?;
            conn.session
                .command("systemctl")
                .arg("reboot")
                .status()
                .await
                .map_err(|e| HerdError::Command(hostname.clone(), e))?;
        }
        Ok(())
    }

    async fn min_space_left(&self, hostnames: &[String]) -> Result<u64, HerdError> {
        let mut min = u64::MAX;
        for hostname in hostnames {
            let conn = self.connection(hostname)?;
            let result = conn
                .session
                .command("df")
                .args(["--output=avail", "-B1", "/var/shepherd"])
                .output()
                .await
                .map_err(|e| HerdError::Command(hostname.clone(), e))?;
            let text = String::from_utf8_lossy(&result.stdout);
            if let Some(bytes) = text.lines().nth(1).and_then(|l| l.trim().parse::<u64>().ok()) {
                min = min.min(bytes);
            }
        }
        Ok(if min == u64::MAX { 0 } else { min })
    }

    async fn resync(&self) -> Result<(), HerdError> {
        self.open().await
    }

    /// The full configured fleet, not just the currently-connected subset —
    /// the status updater derives `offline = known − online` from this
    /// (spec §4.6), so it must enumerate every configured hostname, not
    /// `online_set()`.
    async fn inventorize(&self) -> Result<BTreeMap<String, String>, HerdError> {
        Ok(self.hostnames.iter().map(|hostname| (hostname.clone(), "observer".to_string())).collect())
    }

    async fn result_paths(&self, hostnames: &[String]) -> Result<BTreeMap<String, PathBuf>, HerdError> {
        let mut out = BTreeMap::new();
        for hostname in hostnames {
            out.insert(hostname.clone(), PathBuf::from(format!("/var/shepherd/experiments/{hostname}/result.h5")));
        }
        Ok(out)
    }
}

async fn push_and_start(session: &Session, hostname: &str, body: &str) -> Result<i32, HerdError> {
    let write = session
        .command("bash")
        .args(["-c", &format!("cat > {REMOTE_TASK_PATH} <<'SHEPHERD_EOF'\n{body}\nSHEPHERD_EOF")])
        .status()
        .await
        .map_err(|e| HerdError::Command(hostname.to_string(), e))?;
    if !write.success() {
        return Ok(write.code().unwrap_or(1));
    }
    let start = session
        .command("systemctl")
        .args(["start", SHEEP_SERVICE])
        .status()
        .await
        .map_err(|e| HerdError::Command(hostname.to_string(), e))?;
    Ok(if start.success() { 0 } else { start.code().unwrap_or(1) })
}

fn serde_yaml_placeholder(tasks: &TestbedTasks) -> String {
    // The wire format pushed to observers is an operational detail of the
    // sheep agent, out of scope here; a line-oriented summary is enough to
    // exercise the push path.
    format!("experiment: {}\nobservers: {:?}\n", tasks.experiment_name, tasks.hostnames())
}
