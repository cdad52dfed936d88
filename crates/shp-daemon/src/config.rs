// SPDX-License-Identifier: MIT

//! Process configuration, resolved once at startup from environment
//! overlays onto built-in defaults (spec §9: no module-level globals).
//! Shared by both the scheduler and API binaries.

use std::path::PathBuf;
use std::time::Duration;

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub herd_hostnames: Vec<String>,
    pub dry_run: bool,
    pub experiment_root: PathBuf,
    pub only_elevated: bool,

    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub admin_contact: String,
    pub testbed_name: String,

    pub smtp_relay: String,
    pub smtp_user: Option<String>,
    pub smtp_pass: Option<String>,
    pub mail_from: String,

    pub quota_duration: chrono::Duration,
    pub quota_storage_bytes: i64,

    pub api_bind: String,
    pub prune_interval: Duration,
    pub prune_age_max_user: chrono::Duration,
    pub prune_age_min_experiment: chrono::Duration,
    pub prune_age_max_experiment: chrono::Duration,
    pub prune_dry_run: bool,

    pub ssl_keyfile: PathBuf,
    pub ssl_certfile: PathBuf,
    pub ssl_ca_certs: PathBuf,
}

impl Config {
    /// Resolve from `SHP_*` environment variables, falling back to the
    /// defaults a local/dry-run deployment needs to boot with nothing set.
    pub fn from_env() -> Self {
        let xdg = env_path("SHP_CONFIG_DIR", "/etc/shepherd");
        Self {
            database_url: env_string("SHP_DATABASE_URL", "postgres://localhost/shepherd"),
            herd_hostnames: std::env::var("SHP_HERD_HOSTNAMES")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
            dry_run: env_bool("SHP_DRY_RUN", false),
            experiment_root: env_path("SHP_EXPERIMENT_ROOT", "/var/shepherd/experiments"),
            only_elevated: env_bool("SHP_ONLY_ELEVATED", false),

            jwt_secret: env_string("SHP_JWT_SECRET", "change-me"),
            token_ttl: chrono::Duration::seconds(env_u64("SHP_TOKEN_TTL_SECS", 12 * 3600) as i64),
            admin_contact: env_string("SHP_ADMIN_CONTACT", "admin@test.com"),
            testbed_name: env_string("SHP_TESTBED_NAME", "shepherd"),

            smtp_relay: env_string("SHP_SMTP_RELAY", "localhost"),
            smtp_user: std::env::var("SHP_SMTP_USER").ok(),
            smtp_pass: std::env::var("SHP_SMTP_PASS").ok(),
            mail_from: env_string("SHP_MAIL_FROM", "shepherd@test.com"),

            quota_duration: chrono::Duration::seconds(env_u64("SHP_QUOTA_DURATION_SECS", 3600) as i64),
            quota_storage_bytes: env_u64("SHP_QUOTA_STORAGE_BYTES", 5 * 1024 * 1024 * 1024) as i64,

            api_bind: env_string("SHP_API_BIND", "0.0.0.0:8000"),
            prune_interval: Duration::from_secs(env_u64("SHP_PRUNE_INTERVAL_SECS", 24 * 3600)),
            prune_age_max_user: chrono::Duration::seconds(env_u64("SHP_PRUNE_AGE_MAX_USER_SECS", 180 * 86_400) as i64),
            prune_age_min_experiment: chrono::Duration::seconds(env_u64("SHP_PRUNE_AGE_MIN_EXPERIMENT_SECS", 7 * 86_400) as i64),
            prune_age_max_experiment: chrono::Duration::seconds(env_u64("SHP_PRUNE_AGE_MAX_EXPERIMENT_SECS", 365 * 86_400) as i64),
            prune_dry_run: env_bool("SHP_PRUNE_DRY_RUN", false),

            ssl_keyfile: std::env::var("SHP_SSL_KEYFILE").map(PathBuf::from).unwrap_or_else(|_| xdg.join("ssl_private_key.pem")),
            ssl_certfile: std::env::var("SHP_SSL_CERTFILE").map(PathBuf::from).unwrap_or_else(|_| xdg.join("ssl_certificate.pem")),
            ssl_ca_certs: std::env::var("SHP_SSL_CA_CERTS").map(PathBuf::from).unwrap_or_else(|_| xdg.join("ssl_ca_certs.pem")),
        }
    }

    /// Whether TLS key/cert material is present on disk. Does not check
    /// `ssl_ca_certs`, matching the original's availability probe.
    pub fn tls_available(&self) -> bool {
        self.ssl_keyfile.is_file() && self.ssl_certfile.is_file()
    }
}
