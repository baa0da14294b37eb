//! DAV client
//!
//! Talks WebDAV/CalDAV/CardDAV to one server endpoint.
//! Supports PROPFIND listings, calendar/addressbook REPORT queries and PUT,
//! plus a depth-first walk of the collection hierarchy.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use secrecy::ExposeSecret;
use tracing::{debug, info, instrument, warn};

use crate::config::{DavConfig, TlsMode};
use crate::endpoint::{ServerEndpoint, resource_key};
use crate::error::DavError;
use crate::multistatus::parse_multistatus;
use crate::types::{CalendarItem, CollectionNode};

/// calendar-query REPORT body asking for every VCALENDAR with its data
pub const CALENDAR_QUERY: &str = r#"<c:calendar-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop><d:getetag/><c:calendar-data/></d:prop>
  <c:filter><c:comp-filter name="VCALENDAR"/></c:filter>
</c:calendar-query>"#;

/// addressbook-query REPORT body asking for every vCard with its data
pub const ADDRESSBOOK_QUERY: &str = r#"<card:addressbook-query xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
  <d:prop><d:getetag/><card:address-data/></d:prop>
</card:addressbook-query>"#;

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// DAV operations needed to copy a server's calendars and address books
#[async_trait]
pub trait DavClient: Send + Sync {
    /// Path of `href` below this endpoint's root, for re-rooting elsewhere
    fn relative_path(&self, href: &str) -> Result<String, DavError>;

    /// List the direct children of a container (`None`: the root)
    ///
    /// Returns `Ok(None)` on 404 unless `strict` is set.
    async fn list_children(
        &self,
        path: Option<&str>,
        strict: bool,
    ) -> Result<Option<Vec<CollectionNode>>, DavError>;

    /// Fetch every item of a collection through a calendar-query REPORT
    ///
    /// Returns `Ok(None)` on 404 unless `strict` is set.
    async fn fetch_items(
        &self,
        path: Option<&str>,
        strict: bool,
    ) -> Result<Option<Vec<CalendarItem>>, DavError>;

    /// Fetch every vCard of an address book through an addressbook-query REPORT
    ///
    /// Returns `Ok(None)` on 404 unless `strict` is set.
    async fn fetch_address_items(
        &self,
        path: Option<&str>,
        strict: bool,
    ) -> Result<Option<Vec<CalendarItem>>, DavError>;

    /// Create or overwrite the resource at `href`
    async fn put(&self, href: &str, data: &str) -> Result<(), DavError>;

    /// Depth-first walk below `path`, returning the leaf collections
    async fn collection_nodes(&self, path: Option<&str>)
    -> Result<Vec<CollectionNode>, DavError>;

    /// Depth-first walk below `path`, returning the leaf collection paths
    async fn collection_tree(&self, path: Option<&str>) -> Result<Vec<String>, DavError> {
        Ok(self
            .collection_nodes(path)
            .await?
            .into_iter()
            .map(|node| node.href)
            .collect())
    }
}

/// HTTP-based DAV client implementation
#[derive(Debug)]
pub struct HttpDavClient {
    client: Client,
    endpoint: ServerEndpoint,
    timeout_secs: u64,
}

impl HttpDavClient {
    /// Create a new DAV client
    pub fn new(config: DavConfig) -> Result<Self, DavError> {
        config.validate()?;
        let endpoint = ServerEndpoint::from_config(&config)?;

        if config.tls == TlsMode::Insecure && endpoint.is_https() {
            warn!(
                server = %endpoint.root(),
                "TLS certificate verification is disabled for this endpoint"
            );
        }

        // A 3xx surfaces as HttpStatus; following it could leave the root.
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(config.tls.accepts_invalid_certs())
            .build()
            .map_err(|e| DavError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            timeout_secs: config.timeout_secs,
        })
    }

    /// The endpoint this client talks to
    #[must_use]
    pub const fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }

    /// Issue a request and return the decoded body of a 2xx answer
    ///
    /// `path` is resolved against the endpoint (`None`: the root) and must
    /// stay inside it.
    ///
    /// # Errors
    ///
    /// [`DavError::PathOutsideRoot`] before anything is sent if the path
    /// leaves the root, [`DavError::HttpStatus`] for any non-2xx answer and
    /// [`DavError::ConnectionFailed`] / [`DavError::Timeout`] for transport
    /// failures.
    #[instrument(skip(self, body, headers), fields(server = %self.endpoint.root()))]
    pub async fn request(
        &self,
        method: &str,
        path: Option<&str>,
        body: Option<String>,
        headers: &[(&str, &str)],
    ) -> Result<String, DavError> {
        let url = self.endpoint.resolve(path)?;
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| DavError::InvalidRequest(format!("invalid method {method}: {e}")))?;

        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(password) = self.endpoint.password() {
            request = request.basic_auth(self.endpoint.username(), Some(password.expose_secret()));
        }
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        debug!(%method, %url, "Sending DAV request");

        let response = request.send().await.map_err(|e| self.transport_error(&e))?;
        let status = response.status();
        let response_headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(&e))?;

        if status.is_success() {
            debug!(%method, %url, status = status.as_u16(), body_length = bytes.len(), "DAV request succeeded");
            return String::from_utf8(bytes.to_vec())
                .map_err(|e| DavError::ParseError(format!("response from {url} is not UTF-8: {e}")));
        }

        debug!(%method, %url, status = status.as_u16(), "DAV request failed");
        Err(DavError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
            headers: Box::new(response_headers),
        })
    }

    /// Run a REPORT and collect the entries carrying item data
    async fn report(
        &self,
        path: Option<&str>,
        query: &str,
        strict: bool,
    ) -> Result<Option<Vec<CalendarItem>>, DavError> {
        let xml = match self
            .request(
                "REPORT",
                path,
                Some(query.to_string()),
                &[("Depth", "1"), ("Content-Type", XML_CONTENT_TYPE)],
            )
            .await
        {
            Ok(xml) => xml,
            Err(e) if e.is_not_found() && !strict => {
                debug!(path = ?path, "REPORT target not found, treating as empty");
                return Ok(None);
            },
            Err(e) => return Err(e),
        };

        let items: Vec<CalendarItem> = parse_multistatus(&xml)?
            .into_iter()
            .filter_map(|response| response.into_item())
            .collect();

        debug!(path = ?path, items = items.len(), "Fetched collection items");
        Ok(Some(items))
    }

    fn transport_error(&self, error: &reqwest::Error) -> DavError {
        if error.is_timeout() {
            return DavError::Timeout {
                timeout_secs: self.timeout_secs,
            };
        }
        DavError::ConnectionFailed(error.to_string())
    }
}

/// Content type for a PUT body, guessed from the href's extension
fn content_type_for(href: &str) -> Option<&'static str> {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    let extension = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("ics") => Some("text/calendar; charset=utf-8"),
        Some("vcf") => Some("text/vcard; charset=utf-8"),
        _ => None,
    }
}

#[async_trait]
impl DavClient for HttpDavClient {
    fn relative_path(&self, href: &str) -> Result<String, DavError> {
        self.endpoint.relative_path(href)
    }

    #[instrument(skip(self), fields(server = %self.endpoint.root()))]
    async fn list_children(
        &self,
        path: Option<&str>,
        strict: bool,
    ) -> Result<Option<Vec<CollectionNode>>, DavError> {
        let request_url = self.endpoint.resolve(path)?;

        let xml = match self
            .request(
                "PROPFIND",
                Some(request_url.as_str()),
                None,
                &[("Depth", "1")],
            )
            .await
        {
            Ok(xml) => xml,
            Err(e) if e.is_not_found() && !strict => {
                debug!(url = %request_url, "PROPFIND target not found, treating as empty");
                return Ok(None);
            },
            Err(e) => return Err(e),
        };

        let mut children = Vec::new();
        for response in parse_multistatus(&xml)? {
            let is_self = self
                .endpoint
                .join(&response.href)
                .is_ok_and(|href| self.endpoint.same_resource(&href, &request_url));
            if is_self {
                continue;
            }
            let kind = response.kind();
            children.push(CollectionNode::new(response.href, kind));
        }

        debug!(url = %request_url, children = children.len(), "Listed collection");
        Ok(Some(children))
    }

    #[instrument(skip(self), fields(server = %self.endpoint.root()))]
    async fn fetch_items(
        &self,
        path: Option<&str>,
        strict: bool,
    ) -> Result<Option<Vec<CalendarItem>>, DavError> {
        self.report(path, CALENDAR_QUERY, strict).await
    }

    #[instrument(skip(self), fields(server = %self.endpoint.root()))]
    async fn fetch_address_items(
        &self,
        path: Option<&str>,
        strict: bool,
    ) -> Result<Option<Vec<CalendarItem>>, DavError> {
        self.report(path, ADDRESSBOOK_QUERY, strict).await
    }

    #[instrument(skip(self, data), fields(server = %self.endpoint.root(), size = data.len()))]
    async fn put(&self, href: &str, data: &str) -> Result<(), DavError> {
        let mut headers = Vec::with_capacity(1);
        if let Some(content_type) = content_type_for(href) {
            headers.push(("Content-Type", content_type));
        }

        match self
            .request("PUT", Some(href), Some(data.to_string()), &headers)
            .await
        {
            Ok(_) => {
                debug!(href, "Stored resource");
                Ok(())
            },
            Err(e) => {
                debug!(href, status = e.status(), "Resource not stored");
                Err(e)
            },
        }
    }

    #[instrument(skip(self), fields(server = %self.endpoint.root()))]
    async fn collection_nodes(
        &self,
        path: Option<&str>,
    ) -> Result<Vec<CollectionNode>, DavError> {
        let start = self.endpoint.resolve(path)?;
        let mut visited = HashSet::from([resource_key(&start)]);
        let mut leaves = Vec::new();

        // The walk itself must be able to enumerate its starting point
        let top = self.list_children(path, true).await?.unwrap_or_default();

        // Stack of pending sibling lists keeps the recursive pre-order
        let mut pending = vec![top.into_iter()];
        while let Some(siblings) = pending.last_mut() {
            let Some(node) = siblings.next() else {
                pending.pop();
                continue;
            };

            if node.is_leaf() {
                leaves.push(node);
                continue;
            }

            let key = self.endpoint.join(&node.href).map(|url| resource_key(&url))?;
            if !visited.insert(key) {
                warn!(href = %node.href, "Container listed more than once, not descending again");
                continue;
            }

            match self.list_children(Some(&node.href), false).await? {
                Some(children) => pending.push(children.into_iter()),
                None => warn!(href = %node.href, "Container vanished while walking, skipping"),
            }
        }

        info!(leaves = leaves.len(), "Collection walk finished");
        Ok(leaves)
    }
}
