// SPDX-License-Identifier: MIT

//! User identity and per-user quota overrides.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Role a user account carries.
///
/// Privileges beyond queue-draining for `Elevated` are not specified; today
/// it only affects which users the scheduler's `only_elevated` drain filter
/// admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Elevated,
    Admin,
}

crate::simple_display! {
    UserRole {
        User => "user",
        Elevated => "elevated",
        Admin => "admin",
    }
}

/// Per-user overrides to the configured default duration/storage quotas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserQuota {
    pub custom_quota_expire_date: Option<DateTime<Utc>>,
    pub custom_quota_duration: Option<Duration>,
    pub custom_quota_storage: Option<i64>,
}

impl UserQuota {
    /// Whether the custom override is currently in effect.
    pub fn custom_quota_active(&self, now: DateTime<Utc>) -> bool {
        self.custom_quota_expire_date.is_some_and(|expire| expire >= now)
    }

    /// Effective duration quota: custom override while active, else `default`.
    pub fn quota_duration(&self, now: DateTime<Utc>, default: Duration) -> Duration {
        if self.custom_quota_active(now) {
            self.custom_quota_duration.unwrap_or(default)
        } else {
            default
        }
    }

    /// Effective storage quota in bytes: custom override while active, else `default`.
    pub fn quota_storage(&self, now: DateTime<Utc>, default: i64) -> i64 {
        if self.custom_quota_active(now) {
            self.custom_quota_storage.unwrap_or(default)
        } else {
            default
        }
    }
}

/// A testbed account.
///
/// Invariants: `email` is unique and is changed only by rename onto an
/// unused target email; `password_hash` is salted and never serialized back
/// to a client; a disabled account cannot authenticate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub group: String,
    pub role: UserRole,
    pub disabled: bool,

    pub quota: UserQuota,

    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub email_confirmed_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing)]
    pub token_verification: Option<String>,
    #[serde(skip_serializing)]
    pub token_pw_reset: Option<String>,
}

impl User {
    /// Whether this account may authenticate at all.
    pub fn can_authenticate(&self) -> bool {
        !self.disabled && self.email_confirmed_at.is_some()
    }

    /// Rename the account email. Caller is responsible for checking that
    /// `new_email` is not already taken — the Store enforces the actual
    /// uniqueness constraint.
    pub fn rename(&mut self, new_email: impl Into<String>) {
        self.email = new_email.into();
    }
}

crate::builder! {
    pub struct UserBuilder => User {
        into {
            email: String = "user@test.com",
            password_hash: String = "",
            group: String = "",
        }
        set {
            role: UserRole = UserRole::User,
            disabled: bool = false,
            quota: UserQuota = UserQuota::default(),
        }
        option {
            first_name: String = None,
            last_name: String = None,
            email_confirmed_at: DateTime<Utc> = None,
        }
        computed {
            created_at: DateTime<Utc> = Utc::now(),
            last_active_at: DateTime<Utc> = Utc::now(),
            token_verification: Option<String> = None,
            token_pw_reset: Option<String> = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_quota_falls_back_once_expired() {
        let now = Utc::now();
        let quota = UserQuota {
            custom_quota_expire_date: Some(now - Duration::minutes(1)),
            custom_quota_duration: Some(Duration::minutes(120)),
            custom_quota_storage: Some(1_000_000),
        };
        assert_eq!(quota.quota_duration(now, Duration::minutes(60)), Duration::minutes(60));
        assert_eq!(quota.quota_storage(now, 500), 500);
    }

    #[test]
    fn custom_quota_applies_while_active() {
        let now = Utc::now();
        let quota = UserQuota {
            custom_quota_expire_date: Some(now + Duration::minutes(1)),
            custom_quota_duration: Some(Duration::minutes(120)),
            custom_quota_storage: Some(1_000_000),
        };
        assert_eq!(quota.quota_duration(now, Duration::minutes(60)), Duration::minutes(120));
        assert_eq!(quota.quota_storage(now, 500), 1_000_000);
    }

    #[test]
    fn disabled_account_cannot_authenticate() {
        let mut user = User::builder().email_confirmed_at(Utc::now()).build();
        assert!(user.can_authenticate());
        user.disabled = true;
        assert!(!user.can_authenticate());
    }
}
