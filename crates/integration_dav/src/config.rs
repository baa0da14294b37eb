//! DAV endpoint configuration

use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::DavError;

/// Realm Radicale announces for HTTP Basic authentication
pub const DEFAULT_REALM: &str = "Radicale";

/// Username sent with the configured password when none is given
pub const DEFAULT_USERNAME: &str = "radicale";

/// TLS certificate validation mode
///
/// Skipping verification is only meant for self-signed test or migration
/// servers and has to be selected explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// Validate certificate chain and hostname (default)
    #[default]
    Verify,
    /// Accept any certificate and hostname
    Insecure,
}

impl TlsMode {
    /// Whether invalid certificates are accepted
    #[must_use]
    pub const fn accepts_invalid_certs(self) -> bool {
        matches!(self, Self::Insecure)
    }
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verify => write!(f, "verify"),
            Self::Insecure => write!(f, "insecure"),
        }
    }
}

/// DAV server configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct DavConfig {
    /// Server root URL (e.g., <http://localhost:5232/>)
    pub server_url: String,
    /// Username for Basic authentication
    #[serde(default = "default_username")]
    pub username: String,
    /// Password; authentication is disabled when unset
    #[serde(skip_serializing, default)]
    pub password: Option<SecretString>,
    /// TLS certificate validation mode (default: verify)
    #[serde(default)]
    pub tls: TlsMode,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl fmt::Debug for DavConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DavConfig")
            .field("server_url", &self.server_url)
            .field("username", &self.username)
            .field(
                "password",
                &self.password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("tls", &self.tls)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

const fn default_timeout() -> u64 {
    30
}

impl DavConfig {
    /// Create a configuration with defaults for the given server URL
    #[must_use]
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            username: default_username(),
            password: None,
            tls: TlsMode::default(),
            timeout_secs: default_timeout(),
        }
    }

    /// Set the Basic authentication password
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Set the username
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the TLS validation mode
    #[must_use]
    pub const fn with_tls(mut self, tls: TlsMode) -> Self {
        self.tls = tls;
        self
    }

    /// Set the request timeout
    #[must_use]
    pub const fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), DavError> {
        if self.server_url.trim().is_empty() {
            return Err(DavError::ConfigurationError(
                "server_url must not be empty".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(DavError::ConfigurationError(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
