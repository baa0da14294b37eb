//! Migration service
//!
//! Copies every item below the source root to the same relative path on the
//! destination, one request at a time.

use std::{fmt, sync::Arc};

use integration_dav::{CalendarItem, CollectionKind, CollectionNode, DavClient, DavError};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::MigrationError;

/// Options for a migration run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Log what would be copied without writing to the destination
    pub dry_run: bool,
}

/// A destination write the server refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationFailure {
    /// Destination href, relative to the destination root
    pub href: String,
    /// HTTP status returned by the destination
    pub status: Option<u16>,
    /// Error message
    pub error: String,
}

impl MigrationFailure {
    fn new(href: impl Into<String>, error: &DavError) -> Self {
        Self {
            href: href.into(),
            status: error.status(),
            error: error.to_string(),
        }
    }
}

/// Outcome of a completed migration run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Leaf collections visited on the source
    pub collections: usize,
    /// Items fetched from the source
    pub items_found: usize,
    /// Items stored on the destination
    pub items_copied: usize,
    /// Writes refused by the destination
    pub failures: Vec<MigrationFailure>,
}

impl MigrationReport {
    /// Whether every fetched item was written (always false for a dry run
    /// with items)
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.items_copied == self.items_found
    }

    /// Whether at least one write was refused
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Service copying calendars and address books between two servers
pub struct MigrationService {
    source: Arc<dyn DavClient>,
    destination: Arc<dyn DavClient>,
    options: MigrationOptions,
}

impl fmt::Debug for MigrationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationService")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl MigrationService {
    /// Create a new migration service
    pub fn new(
        source: Arc<dyn DavClient>,
        destination: Arc<dyn DavClient>,
        options: MigrationOptions,
    ) -> Self {
        Self {
            source,
            destination,
            options,
        }
    }

    /// Run the migration
    ///
    /// Refused writes are collected in the report; everything else
    /// (unreachable source, failed listing or fetch, transport errors on
    /// write) aborts the run.
    #[instrument(skip(self), fields(dry_run = self.options.dry_run))]
    pub async fn run(&self) -> Result<MigrationReport, MigrationError> {
        let leaves = self
            .source
            .collection_nodes(None)
            .await
            .map_err(MigrationError::Enumerate)?;
        info!(collections = leaves.len(), "Found collections to migrate");

        let mut report = MigrationReport::default();
        for leaf in &leaves {
            let items = self.fetch_leaf(leaf).await?;
            info!(path = %leaf.href, items = items.len(), "Migrating collection");

            report.collections += 1;
            report.items_found += items.len();
            for item in items {
                self.copy_item(item, &mut report).await?;
            }
        }

        info!(
            collections = report.collections,
            found = report.items_found,
            copied = report.items_copied,
            failed = report.failures.len(),
            "Migration finished"
        );
        Ok(report)
    }

    async fn fetch_leaf(&self, leaf: &CollectionNode) -> Result<Vec<CalendarItem>, MigrationError> {
        let fetch_error = |source: DavError| MigrationError::Fetch {
            path: leaf.href.clone(),
            source,
        };

        let items = self
            .source
            .fetch_items(Some(&leaf.href), false)
            .await
            .map_err(fetch_error)?
            .unwrap_or_default();

        if !items.is_empty() || leaf.kind != CollectionKind::AddressBook {
            return Ok(items);
        }

        debug!(path = %leaf.href, "Calendar query returned nothing, trying addressbook query");
        Ok(self
            .source
            .fetch_address_items(Some(&leaf.href), false)
            .await
            .map_err(fetch_error)?
            .unwrap_or_default())
    }

    async fn copy_item(
        &self,
        item: CalendarItem,
        report: &mut MigrationReport,
    ) -> Result<(), MigrationError> {
        let href = self
            .source
            .relative_path(&item.href)
            .map_err(|source| MigrationError::Write {
                href: item.href.clone(),
                source,
            })?;

        if self.options.dry_run {
            info!(from = %item.href, to = %href, size = item.data.len(), "Would copy item");
            return Ok(());
        }

        match self.destination.put(&href, &item.data).await {
            Ok(()) => {
                debug!(from = %item.href, to = %href, "Copied item");
                report.items_copied += 1;
                Ok(())
            },
            Err(e) if e.is_http_status() => {
                warn!(href = %href, error = %e, "Destination refused item, continuing");
                report.failures.push(MigrationFailure::new(href, &e));
                Ok(())
            },
            Err(source) => Err(MigrationError::Write { href, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// In-memory DAV server rooted at `/`
    #[derive(Debug, Default)]
    struct FakeDav {
        leaves: Vec<CollectionNode>,
        items: HashMap<String, Vec<CalendarItem>>,
        address_items: HashMap<String, Vec<CalendarItem>>,
        put_status: HashMap<String, u16>,
        fail_enumerate: bool,
        fail_fetch: Option<String>,
        fail_put_transport: Option<String>,
        puts: Mutex<Vec<(String, String)>>,
    }

    impl FakeDav {
        fn with_leaf(mut self, href: &str, kind: CollectionKind, items: &[(&str, &str)]) -> Self {
            self.leaves.push(CollectionNode::new(href, kind));
            self.items.insert(
                href.to_string(),
                items
                    .iter()
                    .map(|(href, data)| CalendarItem::new(*href, *data))
                    .collect(),
            );
            self
        }

        fn puts(&self) -> Vec<(String, String)> {
            self.puts.lock().expect("lock").clone()
        }
    }

    fn status_error(status: u16, href: &str) -> DavError {
        DavError::HttpStatus {
            status,
            url: format!("http://fake/{href}"),
            body: String::new(),
            headers: Box::default(),
        }
    }

    #[async_trait]
    impl DavClient for FakeDav {
        fn relative_path(&self, href: &str) -> Result<String, DavError> {
            href.strip_prefix('/')
                .map(str::to_string)
                .ok_or_else(|| DavError::PathOutsideRoot {
                    url: href.to_string(),
                    root: "/".to_string(),
                })
        }

        async fn list_children(
            &self,
            _path: Option<&str>,
            _strict: bool,
        ) -> Result<Option<Vec<CollectionNode>>, DavError> {
            Ok(Some(self.leaves.clone()))
        }

        async fn fetch_items(
            &self,
            path: Option<&str>,
            _strict: bool,
        ) -> Result<Option<Vec<CalendarItem>>, DavError> {
            let path = path.unwrap_or("/");
            if self.fail_fetch.as_deref() == Some(path) {
                return Err(status_error(500, path));
            }
            Ok(self.items.get(path).cloned())
        }

        async fn fetch_address_items(
            &self,
            path: Option<&str>,
            _strict: bool,
        ) -> Result<Option<Vec<CalendarItem>>, DavError> {
            Ok(self.address_items.get(path.unwrap_or("/")).cloned())
        }

        async fn put(&self, href: &str, data: &str) -> Result<(), DavError> {
            if self.fail_put_transport.as_deref() == Some(href) {
                return Err(DavError::ConnectionFailed("reset by peer".to_string()));
            }
            if let Some(status) = self.put_status.get(href) {
                return Err(status_error(*status, href));
            }
            self.puts
                .lock()
                .expect("lock")
                .push((href.to_string(), data.to_string()));
            Ok(())
        }

        async fn collection_nodes(
            &self,
            _path: Option<&str>,
        ) -> Result<Vec<CollectionNode>, DavError> {
            if self.fail_enumerate {
                return Err(DavError::ConnectionFailed("refused".to_string()));
            }
            Ok(self.leaves.clone())
        }
    }

    fn service(source: FakeDav, destination: &Arc<FakeDav>, options: MigrationOptions) -> MigrationService {
        MigrationService::new(Arc::new(source), destination.clone(), options)
    }

    #[tokio::test]
    async fn copies_every_item_to_its_relative_path() {
        let source = FakeDav::default()
            .with_leaf(
                "/alice/home/",
                CollectionKind::Calendar,
                &[("/alice/home/1.ics", "ONE"), ("/alice/home/2.ics", "TWO")],
            )
            .with_leaf(
                "/bob/work/",
                CollectionKind::Calendar,
                &[("/bob/work/3.ics", "THREE")],
            );
        let destination = Arc::new(FakeDav::default());

        let report = service(source, &destination, MigrationOptions::default())
            .run()
            .await
            .expect("migration");

        assert_eq!(
            destination.puts(),
            vec![
                ("alice/home/1.ics".to_string(), "ONE".to_string()),
                ("alice/home/2.ics".to_string(), "TWO".to_string()),
                ("bob/work/3.ics".to_string(), "THREE".to_string()),
            ]
        );
        assert_eq!(report.collections, 2);
        assert_eq!(report.items_found, 3);
        assert_eq!(report.items_copied, 3);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn refused_write_is_recorded_and_the_rest_continue() {
        let source = FakeDav::default().with_leaf(
            "/alice/home/",
            CollectionKind::Calendar,
            &[
                ("/alice/home/1.ics", "ONE"),
                ("/alice/home/2.ics", "TWO"),
                ("/alice/home/3.ics", "THREE"),
            ],
        );
        let destination = Arc::new(FakeDav {
            put_status: HashMap::from([("alice/home/2.ics".to_string(), 403)]),
            ..FakeDav::default()
        });

        let report = service(source, &destination, MigrationOptions::default())
            .run()
            .await
            .expect("migration");

        assert_eq!(destination.puts().len(), 2);
        assert_eq!(report.items_copied, 2);
        assert!(report.has_failures());
        assert!(!report.is_complete());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].href, "alice/home/2.ics");
        assert_eq!(report.failures[0].status, Some(403));
    }

    #[tokio::test]
    async fn transport_error_on_write_aborts() {
        let source = FakeDav::default().with_leaf(
            "/alice/home/",
            CollectionKind::Calendar,
            &[("/alice/home/1.ics", "ONE"), ("/alice/home/2.ics", "TWO")],
        );
        let destination = Arc::new(FakeDav {
            fail_put_transport: Some("alice/home/1.ics".to_string()),
            ..FakeDav::default()
        });

        let err = service(source, &destination, MigrationOptions::default())
            .run()
            .await
            .expect_err("fatal");

        assert!(matches!(err, MigrationError::Write { ref href, .. } if href == "alice/home/1.ics"));
        assert!(destination.puts().is_empty());
    }

    #[tokio::test]
    async fn enumeration_failure_is_fatal() {
        let source = FakeDav {
            fail_enumerate: true,
            ..FakeDav::default()
        };
        let destination = Arc::new(FakeDav::default());

        let err = service(source, &destination, MigrationOptions::default())
            .run()
            .await
            .expect_err("fatal");
        assert!(matches!(err, MigrationError::Enumerate(DavError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn fetch_failure_is_fatal_and_names_the_collection() {
        let source = FakeDav {
            fail_fetch: Some("/bob/work/".to_string()),
            ..FakeDav::default()
        }
        .with_leaf("/alice/home/", CollectionKind::Calendar, &[("/alice/home/1.ics", "ONE")])
        .with_leaf("/bob/work/", CollectionKind::Calendar, &[]);
        let destination = Arc::new(FakeDav::default());

        let err = service(source, &destination, MigrationOptions::default())
            .run()
            .await
            .expect_err("fatal");

        assert!(matches!(err, MigrationError::Fetch { ref path, .. } if path == "/bob/work/"));
        assert_eq!(err.status(), Some(500));
        assert_eq!(destination.puts().len(), 1);
    }

    #[tokio::test]
    async fn missing_collection_counts_as_empty() {
        let mut source = FakeDav::default();
        source
            .leaves
            .push(CollectionNode::new("/gone/", CollectionKind::Calendar));
        let destination = Arc::new(FakeDav::default());

        let report = service(source, &destination, MigrationOptions::default())
            .run()
            .await
            .expect("migration");
        assert_eq!(report.collections, 1);
        assert_eq!(report.items_found, 0);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn address_book_falls_back_to_addressbook_query() {
        let mut source =
            FakeDav::default().with_leaf("/alice/contacts/", CollectionKind::AddressBook, &[]);
        source.address_items.insert(
            "/alice/contacts/".to_string(),
            vec![CalendarItem::new("/alice/contacts/bob.vcf", "BEGIN:VCARD")],
        );
        let destination = Arc::new(FakeDav::default());

        let report = service(source, &destination, MigrationOptions::default())
            .run()
            .await
            .expect("migration");

        assert_eq!(
            destination.puts(),
            vec![("alice/contacts/bob.vcf".to_string(), "BEGIN:VCARD".to_string())]
        );
        assert_eq!(report.items_copied, 1);
    }

    #[tokio::test]
    async fn calendars_do_not_use_addressbook_query() {
        let mut source = FakeDav::default().with_leaf("/alice/home/", CollectionKind::Calendar, &[]);
        source.address_items.insert(
            "/alice/home/".to_string(),
            vec![CalendarItem::new("/alice/home/x.vcf", "BEGIN:VCARD")],
        );
        let destination = Arc::new(FakeDav::default());

        let report = service(source, &destination, MigrationOptions::default())
            .run()
            .await
            .expect("migration");
        assert_eq!(report.items_found, 0);
        assert!(destination.puts().is_empty());
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let source = FakeDav::default().with_leaf(
            "/alice/home/",
            CollectionKind::Calendar,
            &[("/alice/home/1.ics", "ONE")],
        );
        let destination = Arc::new(FakeDav::default());

        let report = service(source, &destination, MigrationOptions { dry_run: true })
            .run()
            .await
            .expect("migration");

        assert!(destination.puts().is_empty());
        assert_eq!(report.items_found, 1);
        assert_eq!(report.items_copied, 0);
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn item_outside_source_root_aborts() {
        let source = FakeDav::default().with_leaf(
            "/alice/home/",
            CollectionKind::Calendar,
            &[("elsewhere/1.ics", "ONE")],
        );
        let destination = Arc::new(FakeDav::default());

        let err = service(source, &destination, MigrationOptions::default())
            .run()
            .await
            .expect_err("fatal");
        assert!(matches!(
            err.dav_error(),
            DavError::PathOutsideRoot { .. }
        ));
    }

    #[test]
    fn report_serializes_failures() {
        let report = MigrationReport {
            collections: 1,
            items_found: 2,
            items_copied: 1,
            failures: vec![MigrationFailure::new(
                "alice/home/2.ics",
                &status_error(403, "alice/home/2.ics"),
            )],
        };
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["items_copied"], 1);
        assert_eq!(json["failures"][0]["href"], "alice/home/2.ics");
        assert_eq!(json["failures"][0]["status"], 403);
    }
}
