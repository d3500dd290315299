//! Atomic coordinator
//!
//! [`Warden`] hands out the user, group and session façades bound to one
//! database handle. [`Warden::atomic_operation`] runs a unit of work against
//! a fresh `Warden` whose façades all share a single transaction, committing
//! when the work succeeds and rolling back when it fails.

use crate::database::{connect_pool, DbHandle, TransactionSlot};
use crate::group::GroupAdmin;
use crate::session::SessionAdmin;
use crate::user::UserAdmin;
use crate::{StoreError, StoreResult};
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use warden_core::WardenConfig;

#[derive(Debug, Clone)]
pub struct Warden {
    db: DbHandle,
}

impl Warden {
    /// Connect using the configured database and bring every schema up to date
    pub async fn connect(config: &WardenConfig) -> StoreResult<Self> {
        let pool = connect_pool(&config.database).await?;
        Self::open(pool).await
    }

    /// Wrap an existing pool and bring every schema up to date
    pub async fn open(pool: SqlitePool) -> StoreResult<Self> {
        let warden = Self::unbuilt(pool);
        warden.build().await?;
        Ok(warden)
    }

    /// Wrap an existing pool without touching the schema
    pub fn unbuilt(pool: SqlitePool) -> Self {
        Self {
            db: DbHandle::Pool(pool),
        }
    }

    pub fn handle(&self) -> &DbHandle {
        &self.db
    }

    /// The underlying pool, absent for transaction-scoped coordinators
    pub fn pool(&self) -> Option<&SqlitePool> {
        self.db.pool()
    }

    pub fn is_atomic(&self) -> bool {
        self.db.is_transaction()
    }

    pub fn users(&self) -> UserAdmin {
        UserAdmin::new(self.db.clone())
    }

    pub fn groups(&self) -> GroupAdmin {
        GroupAdmin::new(self.db.clone())
    }

    pub fn sessions(&self) -> SessionAdmin {
        SessionAdmin::new(self.db.clone())
    }

    /// Build every schema. Sessions and groups reference users, so users go first.
    pub async fn build(&self) -> StoreResult<u32> {
        let applied = self.users().build().await?
            + self.groups().build().await?
            + self.sessions().build().await?;
        if applied > 0 {
            info!(applied, "Schema migrations applied");
        }
        Ok(applied)
    }

    /// Revert every schema, in reverse dependency order
    pub async fn teardown(&self) -> StoreResult<u32> {
        let reverted = self.sessions().teardown().await?
            + self.groups().teardown().await?
            + self.users().teardown().await?;
        info!(reverted, "Schema migrations reverted");
        Ok(reverted)
    }

    /// Run `operation` inside one transaction shared by every façade
    ///
    /// The transaction commits if `operation` returns `Ok` and rolls back if
    /// it returns `Err`; the operation's error is returned unchanged. Calling
    /// this on a transaction-scoped `Warden` fails with
    /// `StoreError::NestedAtomicOperation` before anything is written.
    ///
    /// Façades and sessions obtained inside the operation stop working once
    /// it returns.
    pub async fn atomic_operation<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce(Warden) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<StoreError>,
    {
        let pool = match &self.db {
            DbHandle::Pool(pool) => pool,
            DbHandle::Transaction(_) => return Err(StoreError::NestedAtomicOperation.into()),
        };

        let transaction = pool.begin().await.map_err(StoreError::from)?;
        let slot: TransactionSlot = Arc::new(Mutex::new(Some(transaction)));
        debug!("Atomic operation started");

        let scoped = Warden {
            db: DbHandle::Transaction(slot.clone()),
        };
        let outcome = operation(scoped).await;

        let transaction = slot.lock().await.take().ok_or_else(|| {
            StoreError::program("atomic operation transaction was taken by another owner")
        })?;

        match outcome {
            Ok(value) => {
                transaction.commit().await.map_err(StoreError::from)?;
                debug!("Atomic operation committed");
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_error) = transaction.rollback().await {
                    warn!(error = %rollback_error, "Failed to roll back atomic operation");
                } else {
                    debug!("Atomic operation rolled back");
                }
                Err(e)
            }
        }
    }
}
