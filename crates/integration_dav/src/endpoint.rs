//! Server endpoint model and request URL resolution

use secrecy::SecretString;
use url::Url;

use crate::config::{DEFAULT_REALM, DavConfig};
use crate::error::DavError;

/// One side of a migration: a root URL plus optional credentials
///
/// Every URL handed out by [`ServerEndpoint::resolve`] is contained in the
/// root. Containment is checked on the normalized form (scheme, lowercase
/// host, effective port, path prefix), so equivalent spellings such as
/// `http://Host:80/dav` and `http://host/dav/` are accepted.
#[derive(Debug, Clone)]
pub struct ServerEndpoint {
    root: Url,
    realm: &'static str,
    username: String,
    password: Option<SecretString>,
}

impl ServerEndpoint {
    /// Create an endpoint for a root URL
    pub fn new(
        server_url: &str,
        username: impl Into<String>,
        password: Option<SecretString>,
    ) -> Result<Self, DavError> {
        Ok(Self {
            root: parse_root(server_url)?,
            realm: DEFAULT_REALM,
            username: username.into(),
            password,
        })
    }

    /// Create an endpoint from a client configuration
    pub fn from_config(config: &DavConfig) -> Result<Self, DavError> {
        Self::new(
            &config.server_url,
            config.username.clone(),
            config.password.clone(),
        )
    }

    /// Root URL, always ending with `/`
    #[must_use]
    pub const fn root(&self) -> &Url {
        &self.root
    }

    /// Credential realm
    #[must_use]
    pub const fn realm(&self) -> &'static str {
        self.realm
    }

    /// Basic authentication username
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Basic authentication password, if configured
    #[must_use]
    pub const fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    /// Whether the root uses TLS
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.root.scheme() == "https"
    }

    /// Join a path or href to the root without checking containment
    ///
    /// Full `http(s)` URLs are taken as-is, `/absolute` paths are joined to
    /// the root's origin and anything else is relative to the root.
    pub fn join(&self, path: &str) -> Result<Url, DavError> {
        if let Ok(url) = Url::parse(path)
            && matches!(url.scheme(), "http" | "https")
        {
            return Ok(url);
        }

        let joined = if path.starts_with('/') {
            self.root.join(path)
        } else {
            // "./" keeps a first segment containing ':' from parsing as a scheme
            self.root.join(&format!("./{path}"))
        };

        joined.map_err(|e| DavError::InvalidUrl(format!("{path}: {e}")))
    }

    /// Resolve a request path; `None` is the root itself
    ///
    /// # Errors
    ///
    /// Returns [`DavError::PathOutsideRoot`] if the resolved URL leaves the
    /// endpoint root.
    pub fn resolve(&self, path: Option<&str>) -> Result<Url, DavError> {
        let Some(path) = path else {
            return Ok(self.root.clone());
        };

        let url = self.join(path)?;
        if self.contains(&url) {
            Ok(url)
        } else {
            Err(DavError::PathOutsideRoot {
                url: url.to_string(),
                root: self.root.to_string(),
            })
        }
    }

    /// Whether a URL lies inside the endpoint root
    #[must_use]
    pub fn contains(&self, url: &Url) -> bool {
        let root_path = self.root.path();

        url.scheme() == self.root.scheme()
            && host_key(url) == host_key(&self.root)
            && url.port_or_known_default() == self.root.port_or_known_default()
            && (url.path().starts_with(root_path)
                || format!("{}/", url.path()) == root_path)
    }

    /// Path of `href` below the root, without leading slash
    ///
    /// Used to re-root a source href onto another endpoint.
    pub fn relative_path(&self, href: &str) -> Result<String, DavError> {
        let url = self.resolve(Some(href))?;
        let relative = url
            .path()
            .strip_prefix(self.root.path())
            .unwrap_or_default();
        Ok(relative.to_string())
    }

    /// Whether two hrefs name the same resource, ignoring a trailing slash
    #[must_use]
    pub fn same_resource(&self, a: &Url, b: &Url) -> bool {
        resource_key(a) == resource_key(b)
    }
}

/// Normalized identity of a resource URL
pub(crate) fn resource_key(url: &Url) -> String {
    format!(
        "{}://{}:{}{}",
        url.scheme(),
        host_key(url),
        url.port_or_known_default().unwrap_or_default(),
        url.path().trim_end_matches('/')
    )
}

fn host_key(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_ascii_lowercase()
}

fn parse_root(server_url: &str) -> Result<Url, DavError> {
    let mut root = Url::parse(server_url.trim())
        .map_err(|e| DavError::InvalidUrl(format!("{server_url}: {e}")))?;

    if !matches!(root.scheme(), "http" | "https") {
        return Err(DavError::InvalidUrl(format!(
            "{server_url}: only http and https URLs are supported"
        )));
    }

    if root.host_str().is_none() {
        return Err(DavError::InvalidUrl(format!("{server_url}: missing host")));
    }

    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    root.set_query(None);
    root.set_fragment(None);

    Ok(root)
}
