//! User admin façade
//!
//! Principals that sessions can be bound to. Credentials and profile data
//! belong to the caller; this store only tracks identity.

use crate::database::{from_millis, now};
use crate::migration::{Migration, Migrator, SqlMigration};
use crate::{DbHandle, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::{debug, info};

pub const USER_MIGRATION_TABLE: &str = "user_migration";

fn migrations() -> Vec<Box<dyn Migration>> {
    vec![Box::new(SqlMigration::new(
        "create_users",
        &[r#"
            CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                created INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
            )
        "#],
        &["DROP TABLE users"],
    ))]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created: DateTime<Utc>,
}

impl User {
    pub(crate) fn from_row(row: &SqliteRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            created: from_millis(row.try_get("created")?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct UserAdmin {
    db: DbHandle,
}

impl UserAdmin {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    pub fn migrator(&self) -> StoreResult<Migrator> {
        Migrator::new(self.db.clone(), USER_MIGRATION_TABLE, migrations())
    }

    pub async fn build(&self) -> StoreResult<u32> {
        self.migrator()?.build().await
    }

    pub async fn teardown(&self) -> StoreResult<u32> {
        self.migrator()?.teardown().await
    }

    pub async fn create(&self, username: &str) -> StoreResult<User> {
        let created = now();
        let result = self
            .db
            .execute(
                sqlx::query("INSERT INTO users (username, created) VALUES (?, ?)")
                    .bind(username)
                    .bind(created.timestamp_millis()),
            )
            .await;

        let result = match result {
            Err(e) if e.is_unique_violation() => {
                return Err(StoreError::Conflict {
                    message: format!("username '{}' is already taken", username),
                })
            }
            other => other?,
        };

        let user = User {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            created,
        };
        info!(user_id = user.id, "Created user");
        Ok(user)
    }

    pub async fn get(&self, id: i64) -> StoreResult<User> {
        let row = self
            .db
            .fetch_optional(sqlx::query("SELECT * FROM users WHERE id = ?").bind(id))
            .await?
            .ok_or_else(|| StoreError::not_found("user", id))?;
        User::from_row(&row)
    }

    pub async fn get_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let row = self
            .db
            .fetch_optional(sqlx::query("SELECT * FROM users WHERE username = ?").bind(username))
            .await?;
        row.as_ref().map(User::from_row).transpose()
    }

    /// Principal lookup used by callers that bind sessions to users
    pub async fn exists(&self, id: i64) -> StoreResult<bool> {
        let row = self
            .db
            .fetch_one(sqlx::query("SELECT COUNT(*) AS count FROM users WHERE id = ?").bind(id))
            .await?;
        let count: i64 = row.try_get("count")?;
        Ok(count > 0)
    }

    pub async fn list(&self) -> StoreResult<Vec<User>> {
        let rows = self
            .db
            .fetch_all(sqlx::query("SELECT * FROM users ORDER BY id"))
            .await?;
        rows.iter().map(User::from_row).collect()
    }

    /// Delete a user. Sessions bound to it become anonymous.
    pub async fn delete(&self, id: i64) -> StoreResult<()> {
        let result = self
            .db
            .execute(sqlx::query("DELETE FROM users WHERE id = ?").bind(id))
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user", id));
        }
        debug!(user_id = id, "Deleted user");
        Ok(())
    }
}
