//! Schema migration engine
//!
//! Each subsystem owns one single-row table holding a cursor: the number of
//! its migrations applied so far, in order, from index 0. Migrations are
//! applied and reverted one at a time, and the cursor only moves after the
//! migration body has succeeded.
//!
//! A migration that fails halfway leaves whatever it already changed in
//! place. Run `build`/`teardown` on a transaction-scoped handle when that
//! matters.

use crate::{DbHandle, StoreError, StoreResult};
use async_trait::async_trait;
use sqlx::Row;
use tracing::{debug, info};

/// One reversible schema change
#[async_trait]
pub trait Migration: Send + Sync {
    fn name(&self) -> &str;

    async fn up(&self, db: &DbHandle) -> StoreResult<()>;

    async fn down(&self, db: &DbHandle) -> StoreResult<()>;
}

/// Migration made of plain SQL statements run in order
pub struct SqlMigration {
    name: &'static str,
    up: &'static [&'static str],
    down: &'static [&'static str],
}

impl SqlMigration {
    pub const fn new(
        name: &'static str,
        up: &'static [&'static str],
        down: &'static [&'static str],
    ) -> Self {
        Self { name, up, down }
    }
}

async fn run_statements(db: &DbHandle, statements: &[&str]) -> StoreResult<()> {
    for statement in statements {
        db.execute(sqlx::query(statement)).await?;
    }
    Ok(())
}

#[async_trait]
impl Migration for SqlMigration {
    fn name(&self) -> &str {
        self.name
    }

    async fn up(&self, db: &DbHandle) -> StoreResult<()> {
        run_statements(db, self.up).await
    }

    async fn down(&self, db: &DbHandle) -> StoreResult<()> {
        run_statements(db, self.down).await
    }
}

fn validate_table_name(table: &str) -> StoreResult<()> {
    let valid = !table.is_empty()
        && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !table.starts_with(|c: char| c.is_ascii_digit());

    if valid {
        Ok(())
    } else {
        Err(StoreError::program(format!(
            "invalid migration table name '{}'",
            table
        )))
    }
}

/// Applies and reverts an ordered list of migrations for one subsystem
pub struct Migrator {
    db: DbHandle,
    table: String,
    migrations: Vec<Box<dyn Migration>>,
}

impl Migrator {
    pub fn new(
        db: DbHandle,
        table: impl Into<String>,
        migrations: Vec<Box<dyn Migration>>,
    ) -> StoreResult<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            db,
            table,
            migrations,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    async fn table_exists(&self) -> StoreResult<bool> {
        let row = self
            .db
            .fetch_optional(
                sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                    .bind(&self.table),
            )
            .await?;
        Ok(row.is_some())
    }

    /// Stored cursor, creating the migration table at cursor 0 if it is missing
    pub async fn current_cursor(&self) -> StoreResult<u32> {
        if !self.table_exists().await? {
            debug!("Creating migration table {}", self.table);
            let create = format!(
                "CREATE TABLE {} (migration_number INTEGER NOT NULL)",
                self.table
            );
            self.db.execute(sqlx::query(&create)).await?;
        }

        let select = format!("SELECT migration_number FROM {} LIMIT 1", self.table);
        match self.db.fetch_optional(sqlx::query(&select)).await? {
            Some(row) => {
                let cursor: i64 = row.try_get("migration_number")?;
                u32::try_from(cursor).map_err(|_| {
                    StoreError::program(format!(
                        "corrupt cursor {} in migration table {}",
                        cursor, self.table
                    ))
                })
            }
            None => {
                let insert = format!("INSERT INTO {} (migration_number) VALUES (0)", self.table);
                self.db.execute(sqlx::query(&insert)).await?;
                Ok(0)
            }
        }
    }

    /// Number of known migrations not yet applied
    pub async fn pending(&self) -> StoreResult<usize> {
        let cursor = self.current_cursor().await? as usize;
        Ok(self.migrations.len().saturating_sub(cursor))
    }

    fn migration_failed(&self, index: u32, source: StoreError) -> StoreError {
        StoreError::Migration {
            table: self.table.clone(),
            index,
            source: Box::new(source),
        }
    }

    /// Apply the next migration. Returns false when already up to date.
    pub async fn step_up(&self) -> StoreResult<bool> {
        let cursor = self.current_cursor().await?;
        let Some(migration) = self.migrations.get(cursor as usize) else {
            return Ok(false);
        };

        migration
            .up(&self.db)
            .await
            .map_err(|e| self.migration_failed(cursor, e))?;

        let update = format!(
            "UPDATE {} SET migration_number = migration_number + 1",
            self.table
        );
        self.db.execute(sqlx::query(&update)).await?;

        info!(
            table = %self.table,
            migration = migration.name(),
            cursor = cursor + 1,
            "Applied migration"
        );
        Ok(true)
    }

    /// Revert the most recent migration. Returns false at cursor 0.
    pub async fn step_down(&self) -> StoreResult<bool> {
        let cursor = self.current_cursor().await?;
        if cursor == 0 {
            return Ok(false);
        }

        let index = cursor - 1;
        let migration = self.migrations.get(index as usize).ok_or_else(|| {
            StoreError::program(format!(
                "migration table {} is at {} but only {} migrations are known",
                self.table,
                cursor,
                self.migrations.len()
            ))
        })?;

        migration
            .down(&self.db)
            .await
            .map_err(|e| self.migration_failed(index, e))?;

        let update = format!(
            "UPDATE {} SET migration_number = migration_number - 1",
            self.table
        );
        self.db.execute(sqlx::query(&update)).await?;

        info!(
            table = %self.table,
            migration = migration.name(),
            cursor = index,
            "Reverted migration"
        );
        Ok(true)
    }

    /// Apply every pending migration, returning how many ran
    pub async fn build(&self) -> StoreResult<u32> {
        let mut applied = 0;
        while self.step_up().await? {
            applied += 1;
        }
        debug!(table = %self.table, applied, "Schema is up to date");
        Ok(applied)
    }

    /// Revert every applied migration, returning how many ran
    pub async fn teardown(&self) -> StoreResult<u32> {
        let mut reverted = 0;
        while self.step_down().await? {
            reverted += 1;
        }
        debug!(table = %self.table, reverted, "Schema torn down");
        Ok(reverted)
    }

    /// Move the cursor to exactly `target`
    pub async fn migrate_to(&self, target: u32) -> StoreResult<()> {
        if target as usize > self.migrations.len() {
            return Err(StoreError::program(format!(
                "cannot migrate {} to {}: only {} migrations are known",
                self.table,
                target,
                self.migrations.len()
            )));
        }

        loop {
            let cursor = self.current_cursor().await?;
            if cursor < target {
                self.step_up().await?;
            } else if cursor > target {
                self.step_down().await?;
            } else {
                return Ok(());
            }
        }
    }
}
