//! Resources produced while walking a DAV server

use serde::{Deserialize, Serialize};

/// Kind of an entry found by listing a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    /// Anything that is neither a calendar nor an address book
    Container,
    /// CalDAV calendar collection
    Calendar,
    /// CardDAV address book collection
    AddressBook,
}

impl CollectionKind {
    /// Calendars and address books hold items directly
    #[must_use]
    pub const fn is_leaf(self) -> bool {
        matches!(self, Self::Calendar | Self::AddressBook)
    }
}

/// An entry of a PROPFIND listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionNode {
    /// Resource path as returned by the server
    pub href: String,
    /// Classification from `resourcetype`
    pub kind: CollectionKind,
}

impl CollectionNode {
    /// Create a new node
    pub fn new(href: impl Into<String>, kind: CollectionKind) -> Self {
        Self {
            href: href.into(),
            kind,
        }
    }

    /// Whether the node is a calendar or address book
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.kind.is_leaf()
    }
}

/// A calendar object or vCard with its unparsed body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarItem {
    /// Resource path of the item
    pub href: String,
    /// Raw iCalendar or vCard text
    pub data: String,
}

impl CalendarItem {
    /// Create a new item
    pub fn new(href: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            data: data.into(),
        }
    }
}
