// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to (de)serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record not found")]
    NotFound,

    #[error("email already in use: {0}")]
    EmailTaken(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),
}
