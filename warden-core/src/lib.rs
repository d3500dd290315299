//! Warden Core - shared infrastructure for the Warden session service
//!
//! Error taxonomy, logging setup, configuration and the `Lifetime` value type
//! used by every other crate in the workspace.

pub mod config;
pub mod error;
pub mod lifetime;
pub mod logging;

pub use config::*;
pub use error::*;
pub use lifetime::*;
pub use logging::*;

// Re-export commonly used external types
pub use tracing;
