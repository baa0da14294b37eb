//! DAV client error types

use reqwest::header::HeaderMap;
use thiserror::Error;

/// Errors that can occur while talking to a DAV server
#[derive(Debug, Error)]
pub enum DavError {
    /// Connection to the server failed (refused, DNS, TLS handshake)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timeout
    #[error("Request timed out after {timeout_secs} seconds")]
    Timeout {
        /// The configured timeout in seconds
        timeout_secs: u64,
    },

    /// The server answered with a status outside 200-299
    #[error("HTTP {status} for {url}")]
    HttpStatus {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
        /// Decoded response body
        body: String,
        /// Response headers
        headers: Box<HeaderMap>,
    },

    /// A resolved request URL is not contained in the endpoint root
    #[error("URL {url} is not within endpoint root {root}")]
    PathOutsideRoot {
        /// The offending URL
        url: String,
        /// The endpoint root
        root: String,
    },

    /// A URL or href could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Failed to parse a multistatus document or decode a body
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl DavError {
    /// HTTP status carried by this error, if any
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for an HTTP 404 answer
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 404, .. })
    }

    /// Returns true if the server answered, but not with a success status
    #[must_use]
    pub const fn is_http_status(&self) -> bool {
        matches!(self, Self::HttpStatus { .. })
    }
}
