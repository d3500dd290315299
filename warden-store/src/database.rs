//! Database handle shared by every admin façade
//!
//! A handle is either the connection pool itself or one open transaction.
//! Façades never know which; they run every statement through the handle.

use crate::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use sqlx::{
    query::Query,
    sqlite::{
        SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteQueryResult, SqliteRow,
    },
    Sqlite, SqlitePool, Transaction,
};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use warden_core::DatabaseConfig;

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// Slot holding a transaction until the owning atomic operation resolves it
pub(crate) type TransactionSlot = Arc<Mutex<Option<Transaction<'static, Sqlite>>>>;

#[derive(Clone)]
pub enum DbHandle {
    Pool(SqlitePool),
    Transaction(TransactionSlot),
}

impl std::fmt::Debug for DbHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbHandle::Pool(pool) => f.debug_tuple("Pool").field(pool).finish(),
            DbHandle::Transaction(_) => f.write_str("Transaction"),
        }
    }
}

fn finished() -> StoreError {
    StoreError::program("transaction already finished; handles must not outlive their atomic operation")
}

impl DbHandle {
    pub fn is_transaction(&self) -> bool {
        matches!(self, DbHandle::Transaction(_))
    }

    pub(crate) fn pool(&self) -> Option<&SqlitePool> {
        match self {
            DbHandle::Pool(pool) => Some(pool),
            DbHandle::Transaction(_) => None,
        }
    }

    pub async fn execute(&self, query: SqliteQuery<'_>) -> StoreResult<SqliteQueryResult> {
        match self {
            DbHandle::Pool(pool) => Ok(query.execute(pool).await?),
            DbHandle::Transaction(slot) => {
                let mut guard = slot.lock().await;
                let tx = guard.as_mut().ok_or_else(finished)?;
                Ok(query.execute(&mut **tx).await?)
            }
        }
    }

    pub async fn fetch_one(&self, query: SqliteQuery<'_>) -> StoreResult<SqliteRow> {
        match self {
            DbHandle::Pool(pool) => Ok(query.fetch_one(pool).await?),
            DbHandle::Transaction(slot) => {
                let mut guard = slot.lock().await;
                let tx = guard.as_mut().ok_or_else(finished)?;
                Ok(query.fetch_one(&mut **tx).await?)
            }
        }
    }

    pub async fn fetch_optional(&self, query: SqliteQuery<'_>) -> StoreResult<Option<SqliteRow>> {
        match self {
            DbHandle::Pool(pool) => Ok(query.fetch_optional(pool).await?),
            DbHandle::Transaction(slot) => {
                let mut guard = slot.lock().await;
                let tx = guard.as_mut().ok_or_else(finished)?;
                Ok(query.fetch_optional(&mut **tx).await?)
            }
        }
    }

    pub async fn fetch_all(&self, query: SqliteQuery<'_>) -> StoreResult<Vec<SqliteRow>> {
        match self {
            DbHandle::Pool(pool) => Ok(query.fetch_all(pool).await?),
            DbHandle::Transaction(slot) => {
                let mut guard = slot.lock().await;
                let tx = guard.as_mut().ok_or_else(finished)?;
                Ok(query.fetch_all(&mut **tx).await?)
            }
        }
    }
}

impl From<SqlitePool> for DbHandle {
    fn from(pool: SqlitePool) -> Self {
        DbHandle::Pool(pool)
    }
}

/// Current time at the millisecond precision timestamps are stored with
pub(crate) fn now() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

pub(crate) fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub(crate) fn from_millis_opt(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.map(from_millis)
}

/// Open a connection pool for the configured database
///
/// File databases get their parent directory created. In-memory databases
/// are pinned to one long-lived connection, since every new connection to
/// `sqlite::memory:` would see an empty database.
pub async fn connect_pool(config: &DatabaseConfig) -> StoreResult<SqlitePool> {
    let url = config.resolved_url();
    tracing::info!("Connecting to database: {}", url);

    let options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = if config.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tracing::info!("Creating database directory: {}", parent.display());
                std::fs::create_dir_all(parent).map_err(warden_core::WardenError::from)?;
            }
        }

        SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?
    };

    tracing::info!("Database connection established");
    Ok(pool)
}

/// Pool over a private in-memory database
pub async fn memory_pool() -> StoreResult<SqlitePool> {
    connect_pool(&DatabaseConfig::in_memory()).await
}
