//! Migration settings
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `DAV_MIGRATE_*` environment variables. Nested keys use `__`,
//! e.g. `DAV_MIGRATE_SOURCE__PASSWORD`.

use std::fmt;
use std::path::Path;

use integration_dav::{DEFAULT_USERNAME, DavConfig, TlsMode};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// File looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_NAME: &str = "dav-migrate";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "DAV_MIGRATE";

/// Credentials for one side of the migration
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Basic authentication username
    #[serde(default = "default_username")]
    pub username: String,

    /// Password (sensitive - uses `SecretString`); no authentication if unset
    #[serde(skip_serializing, default)]
    pub password: Option<SecretString>,
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field(
                "password",
                &self.password.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Settings shared by both clients of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrateConfig {
    /// Source server credentials
    #[serde(default)]
    pub source: Credentials,

    /// Destination server credentials
    #[serde(default)]
    pub destination: Credentials,

    /// TLS certificate validation for both servers (default: verify)
    #[serde(default)]
    pub tls: TlsMode,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            source: Credentials::default(),
            destination: Credentials::default(),
            tls: TlsMode::default(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_username() -> String {
    DEFAULT_USERNAME.to_string()
}

const fn default_timeout() -> u64 {
    30
}

impl MigrateConfig {
    /// Load settings from an explicit file (required) or `dav-migrate.toml`
    /// (optional), overridden by the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`Self::load`], reading variables from `env` instead of the
    /// process environment when given
    fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, config::ConfigError> {
        let file = path.map_or_else(
            || config::File::with_name(DEFAULT_CONFIG_NAME).required(false),
            |path| config::File::from(path).required(true),
        );

        let config: Self = config::Config::builder()
            .set_default("tls", TlsMode::default().to_string())?
            .set_default("timeout_secs", default_timeout())?
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides
    #[must_use]
    pub const fn with_overrides(mut self, insecure: bool, timeout_secs: Option<u64>) -> Self {
        if insecure {
            self.tls = TlsMode::Insecure;
        }
        if let Some(timeout_secs) = timeout_secs {
            self.timeout_secs = timeout_secs;
        }
        self
    }

    /// Client configuration for the source server
    #[must_use]
    pub fn source_config(&self, server_url: &str) -> DavConfig {
        self.client_config(server_url, &self.source)
    }

    /// Client configuration for the destination server
    #[must_use]
    pub fn destination_config(&self, server_url: &str) -> DavConfig {
        self.client_config(server_url, &self.destination)
    }

    fn client_config(&self, server_url: &str, credentials: &Credentials) -> DavConfig {
        let mut config = DavConfig::new(server_url)
            .with_username(credentials.username.clone())
            .with_tls(self.tls)
            .with_timeout_secs(self.timeout_secs);
        config.password.clone_from(&credentials.password);
        config
    }

    fn validate(&self) -> Result<(), config::ConfigError> {
        if self.timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
