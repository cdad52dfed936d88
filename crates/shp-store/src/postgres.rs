// SPDX-License-Identifier: MIT

//! Postgres-backed [`Store`]: one JSONB `data` column per table holding the
//! full record, plus a handful of denormalized columns so the predicates
//! and sorts §4.1 requires can be pushed down to SQL instead of scanned in
//! memory.

use crate::error::StoreError;
use crate::store::{changed_fields, Store};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shp_core::id::ExperimentId;
use shp_core::model::{ExperimentState, ExperimentStats, TestbedStatus, User, WebExperiment};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::collections::BTreeMap;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./src/migrations").run(&self.pool).await.map_err(|e| StoreError::Database(e.into()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_value<T: serde::Serialize>(record: &T) -> Result<serde_json::Value, StoreError> {
    Ok(serde_json::to_value(record)?)
}

fn from_value<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, StoreError> {
    Ok(serde_json::from_value(value)?)
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let data = to_value(user)?;
        sqlx::query(
            "INSERT INTO users (email, role, disabled, created_at, last_active_at, \
             token_verification, token_pw_reset, data) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&user.email)
        .bind(user.role.to_string())
        .bind(user.disabled)
        .bind(user.created_at)
        .bind(user.last_active_at)
        .bind(&user.token_verification)
        .bind(&user.token_pw_reset)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::EmailTaken(user.email.clone()),
            _ => StoreError::Database(e),
        })?;
        Ok(())
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let data = to_value(user)?;
        sqlx::query(
            "UPDATE users SET role = $2, disabled = $3, created_at = $4, last_active_at = $5, \
             token_verification = $6, token_pw_reset = $7, data = $8 WHERE email = $1",
        )
        .bind(&user.email)
        .bind(user.role.to_string())
        .bind(user.disabled)
        .bind(user.created_at)
        .bind(user.last_active_at)
        .bind(&user.token_verification)
        .bind(&user.token_pw_reset)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_user_changes(&self, prev: &User, next: &User) -> Result<(), StoreError> {
        let merge = changed_fields(&to_value(prev)?, &to_value(next)?);
        if merge.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE users SET role = $2, disabled = $3, last_active_at = $4, \
             token_verification = $5, token_pw_reset = $6, data = data || $7::jsonb WHERE email = $1",
        )
        .bind(&prev.email)
        .bind(next.role.to_string())
        .bind(next.disabled)
        .bind(next.last_active_at)
        .bind(&next.token_verification)
        .bind(&next.token_pw_reset)
        .bind(serde_json::Value::Object(merge))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT data FROM users WHERE email = $1").bind(email).fetch_optional(&self.pool).await?;
        row.map(|r| from_value(r.get("data"))).transpose()
    }

    async fn find_user_by_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT data FROM users WHERE token_verification = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| from_value(r.get("data"))).transpose()
    }

    async fn find_user_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT data FROM users WHERE token_pw_reset = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| from_value(r.get("data"))).transpose()
    }

    async fn find_all_users(&self) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query("SELECT data FROM users").fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| from_value(r.get("data"))).collect()
    }

    async fn delete_user(&self, email: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM users WHERE email = $1").bind(email).execute(&self.pool).await?;
        Ok(())
    }

    async fn rename_user(&self, old_email: &str, new_email: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT data FROM users WHERE email = $1 FOR UPDATE")
            .bind(old_email)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else { return Err(StoreError::NotFound) };
        let mut user: User = from_value(row.get("data"))?;
        user.rename(new_email);
        let data = to_value(&user)?;

        let result = sqlx::query("UPDATE users SET email = $2, data = $3 WHERE email = $1")
            .bind(old_email)
            .bind(new_email)
            .bind(data)
            .execute(&mut *tx)
            .await;
        match result {
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => return Err(StoreError::EmailTaken(new_email.to_string())),
            Err(e) => return Err(e.into()),
            Ok(_) => {}
        }
        // `ON UPDATE CASCADE` already repointed experiments.owner_email; the
        // denormalized copy inside each record's JSONB blob still needs it.
        sqlx::query("UPDATE experiments SET data = jsonb_set(data, '{owner_email}', to_jsonb($1::text)) WHERE owner_email = $1")
            .bind(new_email)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_experiment(&self, xp: &WebExperiment) -> Result<(), StoreError> {
        let data = to_value(xp)?;
        sqlx::query(
            "INSERT INTO experiments (id, owner_email, created_at, requested_execution_at, \
             started_at, finished_at, result_size, data) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(xp.id.as_uuid())
        .bind(&xp.owner_email)
        .bind(xp.created_at)
        .bind(xp.requested_execution_at)
        .bind(xp.started_at)
        .bind(xp.finished_at)
        .bind(xp.result_size)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_experiment(&self, xp: &WebExperiment) -> Result<(), StoreError> {
        let data = to_value(xp)?;
        sqlx::query(
            "UPDATE experiments SET requested_execution_at = $2, started_at = $3, finished_at = $4, \
             result_size = $5, data = $6 WHERE id = $1",
        )
        .bind(xp.id.as_uuid())
        .bind(xp.requested_execution_at)
        .bind(xp.started_at)
        .bind(xp.finished_at)
        .bind(xp.result_size)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_experiment_changes(&self, prev: &WebExperiment, next: &WebExperiment) -> Result<(), StoreError> {
        let merge = changed_fields(&to_value(prev)?, &to_value(next)?);
        if merge.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE experiments SET requested_execution_at = $2, started_at = $3, finished_at = $4, \
             result_size = $5, data = data || $6::jsonb WHERE id = $1",
        )
        .bind(prev.id.as_uuid())
        .bind(next.requested_execution_at)
        .bind(next.started_at)
        .bind(next.finished_at)
        .bind(next.result_size)
        .bind(serde_json::Value::Object(merge))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_experiment(&self, id: ExperimentId) -> Result<Option<WebExperiment>, StoreError> {
        let row = sqlx::query("SELECT data FROM experiments WHERE id = $1").bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        row.map(|r| from_value(r.get("data"))).transpose()
    }

    async fn find_experiments_by_owner(&self, owner_email: &str) -> Result<Vec<WebExperiment>, StoreError> {
        let rows = sqlx::query("SELECT data FROM experiments WHERE owner_email = $1 ORDER BY created_at ASC")
            .bind(owner_email)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| from_value(r.get("data"))).collect()
    }

    async fn find_all_experiments(&self) -> Result<Vec<WebExperiment>, StoreError> {
        let rows = sqlx::query("SELECT data FROM experiments").fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| from_value(r.get("data"))).collect()
    }

    async fn all_experiment_states(
        &self,
        owner_email: Option<&str>,
    ) -> Result<BTreeMap<ExperimentId, ExperimentState>, StoreError> {
        let experiments = match owner_email {
            Some(email) => self.find_experiments_by_owner(email).await?,
            None => self.find_all_experiments().await?,
        };
        Ok(experiments.into_iter().map(|xp| (xp.id, xp.state())).collect())
    }

    async fn storage_used_by(&self, owner_email: &str) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COALESCE(SUM(result_size), 0)::bigint AS total FROM experiments WHERE owner_email = $1")
            .bind(owner_email)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("total"))
    }

    async fn next_scheduled(&self, only_elevated: bool) -> Result<Option<WebExperiment>, StoreError> {
        let roles: &[&str] = if only_elevated { &["admin", "elevated"] } else { &["admin", "elevated", "user"] };
        let row = sqlx::query(
            "SELECT e.data FROM experiments e JOIN users u ON u.email = e.owner_email \
             WHERE e.requested_execution_at IS NOT NULL AND e.started_at IS NULL AND u.role = ANY($1) \
             ORDER BY e.requested_execution_at ASC, e.id ASC LIMIT 1",
        )
        .bind(roles)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| from_value(r.get("data"))).transpose()
    }

    async fn has_scheduled_by_user(&self, owner_email: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM experiments WHERE owner_email = $1 AND \
             requested_execution_at IS NOT NULL AND started_at IS NULL) AS present",
        )
        .bind(owner_email)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("present"))
    }

    async fn delete_experiment(&self, id: ExperimentId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM experiments WHERE id = $1").bind(id.as_uuid()).execute(&self.pool).await?;
        Ok(())
    }

    async fn request_schedule_experiment(&self, id: ExperimentId, now: DateTime<Utc>) -> Result<WebExperiment, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT data FROM experiments WHERE id = $1 FOR UPDATE").bind(id.as_uuid()).fetch_optional(&mut *tx).await?;
        let Some(row) = row else { return Err(StoreError::NotFound) };
        let mut xp: WebExperiment = from_value(row.get("data"))?;
        xp.request_schedule(now).map_err(|e| StoreError::InvalidTransition(e.to_string()))?;
        let data = to_value(&xp)?;
        sqlx::query("UPDATE experiments SET requested_execution_at = $2, data = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(xp.requested_execution_at)
            .bind(data)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(xp)
    }

    async fn load_testbed_status(&self) -> Result<TestbedStatus, StoreError> {
        let row = sqlx::query("SELECT data FROM testbed_status WHERE id = 1").fetch_optional(&self.pool).await?;
        match row {
            Some(r) => from_value(r.get("data")),
            None => {
                let status = TestbedStatus::default();
                sqlx::query("INSERT INTO testbed_status (id, data) VALUES (1, $1) ON CONFLICT (id) DO NOTHING")
                    .bind(to_value(&status)?)
                    .execute(&self.pool)
                    .await?;
                Ok(status)
            }
        }
    }

    async fn save_testbed_status_changes(&self, prev: &TestbedStatus, next: &TestbedStatus) -> Result<(), StoreError> {
        let merge = changed_fields(&to_value(prev)?, &to_value(next)?);
        if merge.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE testbed_status SET data = data || $1::jsonb WHERE id = 1")
            .bind(serde_json::Value::Object(merge))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_experiment_stats(&self, stats: &ExperimentStats) -> Result<(), StoreError> {
        let data = to_value(stats)?;
        sqlx::query(
            "INSERT INTO experiment_stats (id, owner_email, created_at, deleted_at, data) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET created_at = EXCLUDED.created_at, \
             deleted_at = EXCLUDED.deleted_at, data = EXCLUDED.data",
        )
        .bind(stats.id.as_uuid())
        .bind(&stats.owner_email)
        .bind(stats.created_at)
        .bind(stats.deleted_at)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_experiment_stats(&self, id: ExperimentId) -> Result<Option<ExperimentStats>, StoreError> {
        let row = sqlx::query("SELECT data FROM experiment_stats WHERE id = $1").bind(id.as_uuid()).fetch_optional(&self.pool).await?;
        row.map(|r| from_value(r.get("data"))).transpose()
    }
}
