//! Application services - Use case implementations

mod migration_service;

pub use migration_service::{
    MigrationFailure, MigrationOptions, MigrationReport, MigrationService,
};
