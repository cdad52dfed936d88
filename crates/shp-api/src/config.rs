// SPDX-License-Identifier: MIT

//! API-process configuration, resolved once at startup (spec §9: no
//! module-level globals).

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// HMAC signing secret for issued JWTs.
    pub jwt_secret: String,
    /// Lifetime of an issued access token.
    pub token_ttl: chrono::Duration,
    /// Mailbox notified on account-flow emails and admin-only fallbacks.
    pub admin_contact: String,
    /// Name reported by `GET /testbed`.
    pub testbed_name: String,
    /// Server-side root experiment artifacts are confined to; downloads
    /// outside this root are rejected regardless of what a record claims.
    pub experiment_root: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me".to_string(),
            token_ttl: chrono::Duration::hours(12),
            admin_contact: "admin@test.com".to_string(),
            testbed_name: "shepherd".to_string(),
            experiment_root: PathBuf::from("/var/shepherd/experiments"),
        }
    }
}
