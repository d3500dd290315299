//! Shared test utilities for warden-store integration tests
//!
//! Every test gets a private in-memory database behind a single connection.
//! Inside an atomic operation that connection is held by the transaction, so
//! tests only touch the database through the scoped `Warden` there.

#![allow(dead_code)]

use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Once;
use warden_core::DatabaseConfig;
use warden_store::{connect_pool, memory_pool, Warden};

static INIT: Once = Once::new();

/// Initialize logging for tests
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("warden_store=debug,info")
            .with_test_writer()
            .try_init();
    });
}

pub async fn pool() -> SqlitePool {
    init_logging();
    memory_pool().await.expect("in-memory pool")
}

/// File-backed pool with several connections, for tests that need real concurrency
pub async fn file_pool(dir: &Path, max_connections: u32) -> SqlitePool {
    init_logging();
    let config = DatabaseConfig {
        url: format!("sqlite:{}", dir.join("warden.db").display()),
        max_connections,
    };
    connect_pool(&config).await.expect("file pool")
}

/// Coordinator over a fresh database with every schema built
pub async fn warden() -> Warden {
    Warden::open(pool().await).await.expect("schema build")
}

pub async fn column_names(pool: &SqlitePool, table: &str) -> Vec<String> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await
        .expect("table_info");
    rows.iter().map(|row| row.get::<String, _>("name")).collect()
}

/// Names of every table and index, sorted
pub async fn schema_objects(pool: &SqlitePool) -> Vec<String> {
    let rows = sqlx::query(
        "SELECT name FROM sqlite_master WHERE name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .expect("sqlite_master");
    rows.iter().map(|row| row.get::<String, _>("name")).collect()
}

/// Rows changed on the (single) connection since it was opened
pub async fn total_changes(pool: &SqlitePool) -> i64 {
    sqlx::query("SELECT total_changes() AS changes")
        .fetch_one(pool)
        .await
        .expect("total_changes")
        .get("changes")
}
