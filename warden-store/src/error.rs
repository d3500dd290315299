//! Store error taxonomy
//!
//! Every failure mode a caller may want to branch on is its own variant.

use warden_core::WardenError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No session carries the presented token
    #[error("Invalid session")]
    InvalidSession,

    /// The session exists but its lifetime has elapsed
    #[error("Session expired")]
    ExpiredSession,

    /// The token/renewal token pair is unknown or its renewal window has elapsed
    #[error("Session cannot be renewed")]
    SessionRenewal,

    /// An atomic operation was started on an already transaction-scoped handle
    #[error("Atomic operations cannot be nested")]
    NestedAtomicOperation,

    /// API misuse, e.g. using a handle after its transaction finished
    #[error("Program error: {message}")]
    Program { message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Migration {index} on '{table}' failed: {source}")]
    Migration {
        table: String,
        index: u32,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Core error: {0}")]
    Core(#[from] WardenError),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn program<S: Into<String>>(message: S) -> Self {
        Self::Program {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for the failures a bearer-token check can produce
    pub fn is_session_error(&self) -> bool {
        matches!(
            self,
            StoreError::InvalidSession | StoreError::ExpiredSession | StoreError::SessionRenewal
        )
    }

    /// True when the database rejected a write because of a UNIQUE constraint
    pub(crate) fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}
