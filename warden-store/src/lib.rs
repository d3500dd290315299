//! Warden Store - sessions, schema migrations and atomic operations
//!
//! - [`Migrator`] evolves each subsystem's tables through an ordered list of
//!   reversible migrations tracked by a single cursor.
//! - [`SessionAdmin`] issues, opens, renews and purges bearer-token sessions.
//! - [`Warden`] binds the user, group and session façades to one database
//!   handle and runs multi-entity units of work in a single transaction.

pub mod atomic;
pub mod database;
pub mod error;
pub mod group;
pub mod migration;
pub mod session;
pub mod token;
pub mod user;

pub use atomic::Warden;
pub use database::{connect_pool, memory_pool, DbHandle};
pub use error::{StoreError, StoreResult};
pub use group::{Group, GroupAdmin, GROUP_MIGRATION_TABLE};
pub use migration::{Migration, Migrator, SqlMigration};
pub use session::{
    is_expired, is_renewable, Session, SessionAdmin, SessionView, SESSION_MIGRATION_TABLE,
};
pub use token::{generate_token, TOKEN_LENGTH};
pub use user::{User, UserAdmin, USER_MIGRATION_TABLE};

// Re-export for callers that only depend on this crate
pub use warden_core::Lifetime;
