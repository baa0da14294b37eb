//! Application layer - Migration use case
//!
//! Orchestrates two DAV clients: walks the source server, fetches every
//! leaf collection's items and writes them unchanged to the destination.

pub mod error;
pub mod services;

pub use error::MigrationError;
pub use services::*;
