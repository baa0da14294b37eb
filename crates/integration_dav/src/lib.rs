#![forbid(unsafe_code)]
//! DAV integration
//!
//! Client for CalDAV/CardDAV servers (Radicale, Baïkal, Nextcloud) exposing
//! the primitives needed to walk a server's collection hierarchy and copy
//! its items verbatim: PROPFIND listings, calendar-query REPORTs and PUTs.
//!
//! # Architecture
//!
//! [`DavClient`] defines the operations a migration needs and is implemented
//! by [`HttpDavClient`] on top of `reqwest`. Every request URL is resolved
//! against a [`ServerEndpoint`] and must stay inside its root.
//!
//! # Example
//!
//! ```rust,ignore
//! use integration_dav::{DavClient, DavConfig, HttpDavClient};
//!
//! let client = HttpDavClient::new(DavConfig::new("http://localhost:5232/"))?;
//! for leaf in client.collection_tree(None).await? {
//!     let items = client.fetch_items(Some(&leaf), false).await?.unwrap_or_default();
//!     println!("{leaf}: {} items", items.len());
//! }
//! ```

mod client;
mod config;
mod endpoint;
mod error;
mod multistatus;
mod types;

pub use client::{ADDRESSBOOK_QUERY, CALENDAR_QUERY, DavClient, HttpDavClient};
pub use config::{DEFAULT_REALM, DEFAULT_USERNAME, DavConfig, TlsMode};
pub use endpoint::ServerEndpoint;
pub use error::DavError;
pub use multistatus::{MultiStatusResponse, parse_multistatus};
pub use types::{CalendarItem, CollectionKind, CollectionNode};
