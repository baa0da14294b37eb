//! Application-level errors

use integration_dav::DavError;
use thiserror::Error;

/// Errors that abort a migration run
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The source collection hierarchy could not be walked
    #[error("Failed to enumerate source collections: {0}")]
    Enumerate(#[source] DavError),

    /// Items of a source collection could not be fetched
    #[error("Failed to fetch items from {path}: {source}")]
    Fetch {
        /// Source collection path
        path: String,
        /// Underlying client error
        #[source]
        source: DavError,
    },

    /// An item could not be written and the failure is not a server answer
    #[error("Failed to write {href}: {source}")]
    Write {
        /// Destination href
        href: String,
        /// Underlying client error
        #[source]
        source: DavError,
    },
}

impl MigrationError {
    /// The client error behind this failure
    #[must_use]
    pub const fn dav_error(&self) -> &DavError {
        match self {
            Self::Enumerate(source) | Self::Fetch { source, .. } | Self::Write { source, .. } => {
                source
            },
        }
    }

    /// HTTP status of the underlying error, if the server answered
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        self.dav_error().status()
    }
}
