//! Multistatus (RFC 4918 §13) response parsing
//!
//! Parsing is namespace-aware: elements are matched on their resolved
//! namespace and local name, so `D:`, `d:` or an unprefixed default
//! namespace all work.

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;

use crate::error::DavError;
use crate::types::{CalendarItem, CollectionKind};

const NS_DAV: &[u8] = b"DAV:";
const NS_CALDAV: &[u8] = b"urn:ietf:params:xml:ns:caldav";
const NS_CARDDAV: &[u8] = b"urn:ietf:params:xml:ns:carddav";

/// One `DAV:response` entry, keeping only what a migration needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiStatusResponse {
    /// The entry's `DAV:href`
    pub href: String,
    /// `resourcetype` contains `caldav:calendar`
    pub is_calendar: bool,
    /// `resourcetype` contains `carddav:addressbook`
    pub is_addressbook: bool,
    /// Text of `caldav:calendar-data`
    pub calendar_data: Option<String>,
    /// Text of `carddav:address-data`
    pub address_data: Option<String>,
}

impl MultiStatusResponse {
    /// Classify the entry from its resource type
    #[must_use]
    pub const fn kind(&self) -> CollectionKind {
        if self.is_calendar {
            CollectionKind::Calendar
        } else if self.is_addressbook {
            CollectionKind::AddressBook
        } else {
            CollectionKind::Container
        }
    }

    /// Turn the entry into an item if it carries calendar or address data
    #[must_use]
    pub fn into_item(self) -> Option<CalendarItem> {
        let data = self.calendar_data.or(self.address_data)?;
        Some(CalendarItem::new(self.href, data))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Response,
    Href,
    Propstat,
    Prop,
    Status,
    ResourceType,
    Calendar,
    AddressBook,
    CalendarData,
    AddressData,
    Other,
}

impl Tag {
    fn classify(ns: &ResolveResult<'_>, local: &[u8]) -> Self {
        let ResolveResult::Bound(Namespace(ns)) = ns else {
            return Self::Other;
        };

        match (*ns, local) {
            (NS_DAV, b"response") => Self::Response,
            (NS_DAV, b"href") => Self::Href,
            (NS_DAV, b"propstat") => Self::Propstat,
            (NS_DAV, b"prop") => Self::Prop,
            (NS_DAV, b"status") => Self::Status,
            (NS_DAV, b"resourcetype") => Self::ResourceType,
            (NS_CALDAV, b"calendar") => Self::Calendar,
            (NS_CARDDAV, b"addressbook") => Self::AddressBook,
            (NS_CALDAV, b"calendar-data") => Self::CalendarData,
            (NS_CARDDAV, b"address-data") => Self::AddressData,
            _ => Self::Other,
        }
    }
}

/// Properties gathered from one `propstat`, applied only if its status is 2xx
#[derive(Debug, Default)]
struct Propstat {
    status: Option<String>,
    is_calendar: bool,
    is_addressbook: bool,
    calendar_data: Option<String>,
    address_data: Option<String>,
}

impl Propstat {
    fn is_success(&self) -> bool {
        // A missing status is treated as success
        self.status.as_deref().is_none_or(|line| {
            line.split_whitespace()
                .nth(1)
                .and_then(|code| code.parse::<u16>().ok())
                .is_some_and(|code| (200..300).contains(&code))
        })
    }

    fn apply_to(self, response: &mut MultiStatusResponse) {
        if !self.is_success() {
            return;
        }
        response.is_calendar |= self.is_calendar;
        response.is_addressbook |= self.is_addressbook;
        if self.calendar_data.is_some() {
            response.calendar_data = self.calendar_data;
        }
        if self.address_data.is_some() {
            response.address_data = self.address_data;
        }
    }
}

#[derive(Debug, Default)]
struct State {
    stack: Vec<Tag>,
    responses: Vec<MultiStatusResponse>,
    response: Option<MultiStatusResponse>,
    propstat: Option<Propstat>,
    text: String,
}

impl State {
    fn parent(&self) -> Option<Tag> {
        self.stack.last().copied()
    }

    fn open(&mut self, tag: Tag) {
        let parent = self.parent();
        match tag {
            Tag::Response => self.response = Some(MultiStatusResponse::default()),
            Tag::Propstat if self.response.is_some() => self.propstat = Some(Propstat::default()),
            Tag::Href | Tag::Status | Tag::CalendarData | Tag::AddressData => self.text.clear(),
            Tag::Calendar if parent == Some(Tag::ResourceType) => {
                if let Some(propstat) = self.propstat.as_mut() {
                    propstat.is_calendar = true;
                }
            },
            Tag::AddressBook if parent == Some(Tag::ResourceType) => {
                if let Some(propstat) = self.propstat.as_mut() {
                    propstat.is_addressbook = true;
                }
            },
            _ => {},
        }
        self.stack.push(tag);
    }

    fn close(&mut self) {
        let Some(tag) = self.stack.pop() else {
            return;
        };
        let parent = self.parent();

        match (tag, parent) {
            (Tag::Href, Some(Tag::Response)) => {
                if let Some(response) = self.response.as_mut() {
                    response.href = self.text.trim().to_string();
                }
            },
            (Tag::Status, Some(Tag::Propstat)) => {
                if let Some(propstat) = self.propstat.as_mut() {
                    propstat.status = Some(self.text.trim().to_string());
                }
            },
            (Tag::CalendarData, Some(Tag::Prop)) => {
                if let Some(propstat) = self.propstat.as_mut()
                    && !self.text.trim().is_empty()
                {
                    propstat.calendar_data = Some(std::mem::take(&mut self.text));
                }
            },
            (Tag::AddressData, Some(Tag::Prop)) => {
                if let Some(propstat) = self.propstat.as_mut()
                    && !self.text.trim().is_empty()
                {
                    propstat.address_data = Some(std::mem::take(&mut self.text));
                }
            },
            (Tag::Propstat, _) => {
                if let (Some(propstat), Some(response)) =
                    (self.propstat.take(), self.response.as_mut())
                {
                    propstat.apply_to(response);
                }
            },
            (Tag::Response, _) => {
                if let Some(response) = self.response.take()
                    && !response.href.is_empty()
                {
                    self.responses.push(response);
                }
            },
            _ => {},
        }
    }

    fn captures_text(&self) -> bool {
        matches!(
            self.parent(),
            Some(Tag::Href | Tag::Status | Tag::CalendarData | Tag::AddressData)
        )
    }
}

/// Parse a multistatus document into its response entries, in document order
///
/// Entries without an href are dropped. Calendar and address data are kept
/// verbatim apart from XML unescaping.
///
/// # Errors
///
/// Returns [`DavError::ParseError`] for malformed XML.
pub fn parse_multistatus(xml: &str) -> Result<Vec<MultiStatusResponse>, DavError> {
    let mut reader = NsReader::from_str(xml);
    let mut state = State::default();

    loop {
        let (ns, event) = reader
            .read_resolved_event()
            .map_err(|e| DavError::ParseError(format!("malformed multistatus: {e}")))?;

        match event {
            Event::Start(e) => {
                let tag = classify(&ns, &e);
                state.open(tag);
            },
            Event::Empty(e) => {
                let tag = classify(&ns, &e);
                state.open(tag);
                state.close();
            },
            Event::End(_) => state.close(),
            Event::Text(e) if state.captures_text() => {
                let text = e
                    .unescape()
                    .map_err(|e| DavError::ParseError(format!("invalid text content: {e}")))?;
                state.text.push_str(&text);
            },
            Event::CData(e) if state.captures_text() => {
                let text = std::str::from_utf8(&e)
                    .map_err(|e| DavError::ParseError(format!("invalid CDATA: {e}")))?;
                state.text.push_str(text);
            },
            Event::Eof => break,
            _ => {},
        }
    }

    Ok(state.responses)
}

fn classify(ns: &ResolveResult<'_>, element: &BytesStart<'_>) -> Tag {
    Tag::classify(ns, element.local_name().as_ref())
}
