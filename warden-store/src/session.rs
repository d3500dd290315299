//! Session store
//!
//! Sessions are opaque bearer tokens, optionally bound to a user. A session
//! moves through these states:
//!
//! - valid, anonymous or bound to a user: `open` succeeds
//! - expired but still renewable: `open` fails with `ExpiredSession`, while
//!   `renew` with the matching renewal token issues fresh tokens
//! - unrenewable: removed by `purge`
//!
//! Timestamps are compared at millisecond precision and every deadline is
//! exclusive: a session is expired once `expires <= now` and renewable
//! while `renewable_until > now`. Purge removes exactly the rows that are no
//! longer renewable.
//!
//! [`Session`] values are snapshots of the row at the time they were read or
//! last written through that same value. Use [`SessionAdmin::open`] or
//! [`SessionAdmin::get`] to observe changes made elsewhere.

use crate::database::{from_millis, from_millis_opt, now};
use crate::migration::{Migration, Migrator, SqlMigration};
use crate::token::generate_token;
use crate::{DbHandle, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use warden_core::Lifetime;

pub const SESSION_MIGRATION_TABLE: &str = "session_migration";

const SESSION_COLUMNS: &str =
    "id, session_token, principal_id, expires, renewal_token, renewable_until, created";

fn migrations() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(SqlMigration::new(
            "create_sessions",
            &[
                r#"
                CREATE TABLE sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_token TEXT NOT NULL UNIQUE,
                    principal_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                    expires INTEGER,
                    created INTEGER NOT NULL DEFAULT (CAST(strftime('%s', 'now') AS INTEGER) * 1000)
                )
                "#,
                "CREATE INDEX idx_sessions_principal ON sessions(principal_id)",
            ],
            &["DROP INDEX idx_sessions_principal", "DROP TABLE sessions"],
        )),
        Box::new(SqlMigration::new(
            "add_session_renewal",
            &[
                "ALTER TABLE sessions ADD COLUMN renewal_token TEXT",
                "ALTER TABLE sessions ADD COLUMN renewable_until INTEGER",
                "CREATE INDEX idx_sessions_renewable_until ON sessions(renewable_until)",
            ],
            &[
                "DROP INDEX idx_sessions_renewable_until",
                "ALTER TABLE sessions DROP COLUMN renewable_until",
                "ALTER TABLE sessions DROP COLUMN renewal_token",
            ],
        )),
    ]
}

/// True when a session with this expiry can no longer be opened at `now`
pub fn is_expired(expires: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(expires, Some(expires) if expires <= now)
}

/// True when a session with this renewal deadline still accepts renewal at `now`
pub fn is_renewable(renewable_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    renewable_until.map_or(true, |until| until > now)
}

/// Expiry and renewal deadline for a lifetime starting at `start`
///
/// No lifetime means the session never expires and is never purged. No
/// renewal period means the renewal window closes when the session expires.
/// Lifetimes too long to resolve are rejected before anything is written.
fn deadlines(
    start: DateTime<Utc>,
    lifetime: Option<Lifetime>,
    renewal_period: Option<Lifetime>,
) -> StoreResult<(Option<DateTime<Utc>>, Option<DateTime<Utc>>)> {
    let Some(lifetime) = lifetime else {
        return Ok((None, None));
    };
    let expires = lifetime.after(start)?;
    let renewable_until = match renewal_period {
        Some(period) => period.after(expires)?,
        None => expires,
    };
    Ok((Some(expires), Some(renewable_until)))
}

fn millis(instant: Option<DateTime<Utc>>) -> Option<i64> {
    instant.map(|i| i.timestamp_millis())
}

/// Serializable view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub id: i64,
    pub token: String,
    pub user_id: Option<i64>,
    pub expires: Option<DateTime<Utc>>,
    pub renewal_token: Option<String>,
    pub renewable_until: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
}

/// Handle to one session row
#[derive(Debug, Clone)]
pub struct Session {
    db: DbHandle,
    id: i64,
    token: String,
    user_id: Option<i64>,
    expires: Option<DateTime<Utc>>,
    renewal_token: Option<String>,
    renewable_until: Option<DateTime<Utc>>,
    created: DateTime<Utc>,
}

impl Session {
    fn from_row(db: DbHandle, row: &SqliteRow) -> StoreResult<Self> {
        Ok(Self {
            db,
            id: row.try_get("id")?,
            token: row.try_get("session_token")?,
            user_id: row.try_get("principal_id")?,
            expires: from_millis_opt(row.try_get("expires")?),
            renewal_token: row.try_get("renewal_token")?,
            renewable_until: from_millis_opt(row.try_get("renewable_until")?),
            created: from_millis(row.try_get("created")?),
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.expires
    }

    pub fn renewal_token(&self) -> Option<&str> {
        self.renewal_token.as_deref()
    }

    pub fn renewable_until(&self) -> Option<DateTime<Utc>> {
        self.renewable_until
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        is_expired(self.expires, now)
    }

    pub fn is_renewable_at(&self, now: DateTime<Utc>) -> bool {
        self.renewal_token.is_some() && is_renewable(self.renewable_until, now)
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            token: self.token.clone(),
            user_id: self.user_id,
            expires: self.expires,
            renewal_token: self.renewal_token.clone(),
            renewable_until: self.renewable_until,
            created: self.created,
        }
    }

    /// Bind the session to a user
    pub async fn set_user_id(&mut self, user_id: i64) -> StoreResult<()> {
        self.db
            .execute(
                sqlx::query("UPDATE sessions SET principal_id = ? WHERE id = ?")
                    .bind(user_id)
                    .bind(self.id),
            )
            .await?;
        self.user_id = Some(user_id);
        debug!(session_id = self.id, user_id, "Bound session to user");
        Ok(())
    }

    /// Make the session anonymous again
    pub async fn discard_user_id(&mut self) -> StoreResult<()> {
        self.db
            .execute(sqlx::query("UPDATE sessions SET principal_id = NULL WHERE id = ?").bind(self.id))
            .await?;
        self.user_id = None;
        debug!(session_id = self.id, "Unbound session from user");
        Ok(())
    }

    /// Restart the session's clock: both deadlines are recomputed from now
    pub async fn update_lifetime(
        &mut self,
        lifetime: Option<Lifetime>,
        renewal_period: Option<Lifetime>,
    ) -> StoreResult<()> {
        let (expires, renewable_until) = deadlines(now(), lifetime, renewal_period)?;
        self.db
            .execute(
                sqlx::query("UPDATE sessions SET expires = ?, renewable_until = ? WHERE id = ?")
                    .bind(millis(expires))
                    .bind(millis(renewable_until))
                    .bind(self.id),
            )
            .await?;
        self.expires = expires;
        self.renewable_until = renewable_until;
        debug!(session_id = self.id, "Updated session lifetime");
        Ok(())
    }

    /// Delete the session row. Deleting an already removed session is not an error.
    pub async fn destroy(&self) -> StoreResult<()> {
        self.db
            .execute(sqlx::query("DELETE FROM sessions WHERE id = ?").bind(self.id))
            .await?;
        debug!(session_id = self.id, "Destroyed session");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SessionAdmin {
    db: DbHandle,
}

impl SessionAdmin {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    pub fn migrator(&self) -> StoreResult<Migrator> {
        Migrator::new(self.db.clone(), SESSION_MIGRATION_TABLE, migrations())
    }

    pub async fn build(&self) -> StoreResult<u32> {
        self.migrator()?.build().await
    }

    pub async fn teardown(&self) -> StoreResult<u32> {
        self.migrator()?.teardown().await
    }

    /// Issue a new anonymous session
    ///
    /// A non-positive lifetime is accepted and yields an already expired
    /// session.
    pub async fn create(
        &self,
        lifetime: Option<Lifetime>,
        renewal_period: Option<Lifetime>,
    ) -> StoreResult<Session> {
        let created = now();
        let (expires, renewable_until) = deadlines(created, lifetime, renewal_period)?;
        let token = generate_token();
        let renewal_token = generate_token();

        let result = self
            .db
            .execute(
                sqlx::query(
                    r#"
                    INSERT INTO sessions (session_token, principal_id, expires, renewal_token, renewable_until, created)
                    VALUES (?, NULL, ?, ?, ?, ?)
                    "#,
                )
                .bind(&token)
                .bind(millis(expires))
                .bind(&renewal_token)
                .bind(millis(renewable_until))
                .bind(created.timestamp_millis()),
            )
            .await?;

        let session = Session {
            db: self.db.clone(),
            id: result.last_insert_rowid(),
            token,
            user_id: None,
            expires,
            renewal_token: Some(renewal_token),
            renewable_until,
            created,
        };
        debug!(session_id = session.id, "Created session");
        Ok(session)
    }

    /// Look a session up by its token, rejecting unknown and expired ones
    pub async fn open(&self, token: &str) -> StoreResult<Session> {
        let query = format!("SELECT {} FROM sessions WHERE session_token = ?", SESSION_COLUMNS);
        let row = self
            .db
            .fetch_optional(sqlx::query(&query).bind(token))
            .await?
            .ok_or(StoreError::InvalidSession)?;

        let session = Session::from_row(self.db.clone(), &row)?;
        if session.is_expired_at(now()) {
            debug!(session_id = session.id, "Rejected expired session");
            return Err(StoreError::ExpiredSession);
        }
        Ok(session)
    }

    /// Fetch a session by id regardless of its expiry
    pub async fn get(&self, id: i64) -> StoreResult<Session> {
        let query = format!("SELECT {} FROM sessions WHERE id = ?", SESSION_COLUMNS);
        let row = self
            .db
            .fetch_optional(sqlx::query(&query).bind(id))
            .await?
            .ok_or_else(|| StoreError::not_found("session", id))?;
        Session::from_row(self.db.clone(), &row)
    }

    /// Replace both tokens of a still-renewable session and restart its clock
    ///
    /// The old token does not need to be unexpired. The swap is a single
    /// conditional update keyed on the old token pair, so when two renewals
    /// race only one of them matches.
    pub async fn renew(
        &self,
        token: &str,
        lifetime: Option<Lifetime>,
        renewal_token: &str,
        renewal_period: Option<Lifetime>,
    ) -> StoreResult<Session> {
        let now = now();
        let (expires, renewable_until) = deadlines(now, lifetime, renewal_period)?;
        let new_token = generate_token();
        let new_renewal_token = generate_token();

        let query = format!(
            r#"
            UPDATE sessions
            SET session_token = ?, expires = ?, renewal_token = ?, renewable_until = ?
            WHERE session_token = ?
              AND renewal_token = ?
              AND (renewable_until IS NULL OR renewable_until > ?)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        );

        let row = self
            .db
            .fetch_optional(
                sqlx::query(&query)
                    .bind(&new_token)
                    .bind(millis(expires))
                    .bind(&new_renewal_token)
                    .bind(millis(renewable_until))
                    .bind(token)
                    .bind(renewal_token)
                    .bind(now.timestamp_millis()),
            )
            .await?;

        match row {
            Some(row) => {
                let session = Session::from_row(self.db.clone(), &row)?;
                info!(session_id = session.id, "Renewed session");
                Ok(session)
            }
            None => {
                warn!("Rejected session renewal");
                Err(StoreError::SessionRenewal)
            }
        }
    }

    /// Delete every session whose renewal window has closed
    ///
    /// Sessions without a renewal deadline are never purged.
    pub async fn purge(&self) -> StoreResult<u64> {
        let result = self
            .db
            .execute(
                sqlx::query(
                    "DELETE FROM sessions WHERE renewable_until IS NOT NULL AND renewable_until <= ?",
                )
                .bind(now().timestamp_millis()),
            )
            .await?;

        let purged = result.rows_affected();
        if purged > 0 {
            info!(purged, "Purged unrenewable sessions");
        }
        Ok(purged)
    }

    /// Delete the session carrying `token`, expired or not
    pub async fn revoke(&self, token: &str) -> StoreResult<bool> {
        let result = self
            .db
            .execute(sqlx::query("DELETE FROM sessions WHERE session_token = ?").bind(token))
            .await?;
        let revoked = result.rows_affected() > 0;
        if revoked {
            debug!("Revoked session by token");
        }
        Ok(revoked)
    }

    pub async fn list_for_user(&self, user_id: i64) -> StoreResult<Vec<Session>> {
        let query = format!(
            "SELECT {} FROM sessions WHERE principal_id = ? ORDER BY id",
            SESSION_COLUMNS
        );
        let rows = self.db.fetch_all(sqlx::query(&query).bind(user_id)).await?;
        rows.iter()
            .map(|row| Session::from_row(self.db.clone(), row))
            .collect()
    }

    /// Revoke every session bound to a user, returning how many were removed
    pub async fn destroy_all_for_user(&self, user_id: i64) -> StoreResult<u64> {
        let result = self
            .db
            .execute(sqlx::query("DELETE FROM sessions WHERE principal_id = ?").bind(user_id))
            .await?;
        let destroyed = result.rows_affected();
        info!(user_id, destroyed, "Destroyed user sessions");
        Ok(destroyed)
    }

    /// Run `purge` every `interval` on a background task
    ///
    /// Failures are logged and retried on the next tick. The task runs until
    /// the returned handle is aborted. Only pool-backed stores can be used,
    /// since a transaction must not outlive its atomic operation.
    pub fn spawn_purge_task(&self, interval: Duration) -> StoreResult<JoinHandle<()>> {
        if self.db.is_transaction() {
            return Err(StoreError::program(
                "purge task cannot run on a transaction-scoped store",
            ));
        }

        let admin = self.clone();
        Ok(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match admin.purge().await {
                    Ok(purged) => debug!(purged, "Background purge finished"),
                    Err(e) => error!(error = %e, "Background purge failed"),
                }
            }
        }))
    }
}
