//! Group admin façade and membership lookups

use crate::database::{from_millis, now};
use crate::migration::{Migration, Migrator, SqlMigration};
use crate::user::User;
use crate::{DbHandle, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row};
use tracing::{debug, info};

pub const GROUP_MIGRATION_TABLE: &str = "group_migration";

fn migrations() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(SqlMigration::new(
            "create_groups",
            &[r#"
                CREATE TABLE user_groups (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE,
                    created INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
                )
            "#],
            &["DROP TABLE user_groups"],
        )),
        Box::new(SqlMigration::new(
            "create_group_members",
            &[
                r#"
                CREATE TABLE group_members (
                    group_id INTEGER NOT NULL REFERENCES user_groups(id) ON DELETE CASCADE,
                    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                    PRIMARY KEY (group_id, user_id)
                )
                "#,
                "CREATE INDEX idx_group_members_user ON group_members(user_id)",
            ],
            &["DROP INDEX idx_group_members_user", "DROP TABLE group_members"],
        )),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub created: DateTime<Utc>,
}

impl Group {
    fn from_row(row: &SqliteRow) -> StoreResult<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created: from_millis(row.try_get("created")?),
        })
    }
}

#[derive(Debug, Clone)]
pub struct GroupAdmin {
    db: DbHandle,
}

impl GroupAdmin {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    pub fn migrator(&self) -> StoreResult<Migrator> {
        Migrator::new(self.db.clone(), GROUP_MIGRATION_TABLE, migrations())
    }

    pub async fn build(&self) -> StoreResult<u32> {
        self.migrator()?.build().await
    }

    pub async fn teardown(&self) -> StoreResult<u32> {
        self.migrator()?.teardown().await
    }

    pub async fn create(&self, name: &str) -> StoreResult<Group> {
        let created = now();
        let result = self
            .db
            .execute(
                sqlx::query("INSERT INTO user_groups (name, created) VALUES (?, ?)")
                    .bind(name)
                    .bind(created.timestamp_millis()),
            )
            .await;

        let result = match result {
            Err(e) if e.is_unique_violation() => {
                return Err(StoreError::Conflict {
                    message: format!("group '{}' already exists", name),
                })
            }
            other => other?,
        };

        let group = Group {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            created,
        };
        info!(group_id = group.id, "Created group");
        Ok(group)
    }

    pub async fn get(&self, id: i64) -> StoreResult<Group> {
        let row = self
            .db
            .fetch_optional(sqlx::query("SELECT * FROM user_groups WHERE id = ?").bind(id))
            .await?
            .ok_or_else(|| StoreError::not_found("group", id))?;
        Group::from_row(&row)
    }

    pub async fn delete(&self, id: i64) -> StoreResult<()> {
        let result = self
            .db
            .execute(sqlx::query("DELETE FROM user_groups WHERE id = ?").bind(id))
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("group", id));
        }
        debug!(group_id = id, "Deleted group");
        Ok(())
    }

    /// Add a user to a group. Adding an existing member is a no-op.
    pub async fn add_member(&self, group_id: i64, user_id: i64) -> StoreResult<()> {
        self.db
            .execute(
                sqlx::query("INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?, ?)")
                    .bind(group_id)
                    .bind(user_id),
            )
            .await?;
        debug!(group_id, user_id, "Added group member");
        Ok(())
    }

    /// Remove a user from a group, returning whether it was a member
    pub async fn remove_member(&self, group_id: i64, user_id: i64) -> StoreResult<bool> {
        let result = self
            .db
            .execute(
                sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
                    .bind(group_id)
                    .bind(user_id),
            )
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn members(&self, group_id: i64) -> StoreResult<Vec<User>> {
        let rows = self
            .db
            .fetch_all(
                sqlx::query(
                    r#"
                    SELECT u.id, u.username, u.created
                    FROM users u
                    JOIN group_members m ON m.user_id = u.id
                    WHERE m.group_id = ?
                    ORDER BY u.id
                    "#,
                )
                .bind(group_id),
            )
            .await?;

        rows.iter().map(User::from_row).collect()
    }

    /// Groups a user belongs to
    pub async fn groups_for(&self, user_id: i64) -> StoreResult<Vec<Group>> {
        let rows = self
            .db
            .fetch_all(
                sqlx::query(
                    r#"
                    SELECT g.id, g.name, g.created
                    FROM user_groups g
                    JOIN group_members m ON m.group_id = g.id
                    WHERE m.user_id = ?
                    ORDER BY g.id
                    "#,
                )
                .bind(user_id),
            )
            .await?;
        rows.iter().map(Group::from_row).collect()
    }
}
