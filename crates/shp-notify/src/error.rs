// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("failed to build address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("send failed: {0}")]
    Send(#[from] lettre::transport::smtp::Error),
}
