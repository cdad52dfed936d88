// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HerdError {
    #[error("ssh connection to {hostname} failed: {source}")]
    Connect { hostname: String, #[source] source: openssh::Error },

    #[error("remote command on {hostname} failed: {0}")]
    Command(String, #[source] std::io::Error),

    #[error("herd not opened yet")]
    NotOpen,

    #[error("no online observers to address")]
    NoObserversOnline,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
