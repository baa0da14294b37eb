//! dav-migrate CLI
//!
//! Copies every calendar and address book from one CalDAV/CardDAV server to
//! another.

#![allow(clippy::print_stdout)]

mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use application::{MigrationOptions, MigrationReport, MigrationService};
use clap::Parser;
use integration_dav::HttpDavClient;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::MigrateConfig;

/// Exit status when a run is aborted
const EXIT_FATAL: u8 = 1;

/// Exit status for `--fail-on-partial` when the destination refused items
const EXIT_PARTIAL: u8 = 2;

/// dav-migrate CLI
#[derive(Debug, Parser)]
#[command(name = "dav-migrate")]
#[command(author, version, about = "Copy calendars and address books between DAV servers", long_about = None)]
struct Cli {
    /// Root URL of the server to copy from
    from_url: String,

    /// Root URL of the server to copy to
    to_url: String,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Accept any TLS certificate and hostname on both servers
    #[arg(long)]
    insecure: bool,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Configuration file (default: dav-migrate.toml if present)
    #[arg(short, long, env = "DAV_MIGRATE_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Walk and fetch the source without writing to the destination
    #[arg(long)]
    dry_run: bool,

    /// Exit with status 2 if the destination refused any item
    #[arg(long)]
    fail_on_partial: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Emit log lines as JSON
    #[arg(long)]
    log_json: bool,
}

/// Determine log filter level from verbosity count
const fn log_filter_from_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Exit status for a finished run
fn exit_status(report: &MigrationReport, fail_on_partial: bool) -> u8 {
    if fail_on_partial && report.has_failures() {
        EXIT_PARTIAL
    } else {
        0
    }
}

fn init_tracing(verbose: u8, json: bool) {
    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter_from_verbosity(verbose)));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn migrate(cli: &Cli) -> anyhow::Result<MigrationReport> {
    let settings = MigrateConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?
        .with_overrides(cli.insecure, cli.timeout_secs);

    let source = HttpDavClient::new(settings.source_config(&cli.from_url))
        .with_context(|| format!("Invalid source server {}", cli.from_url))?;
    let destination = HttpDavClient::new(settings.destination_config(&cli.to_url))
        .with_context(|| format!("Invalid destination server {}", cli.to_url))?;

    info!(
        from = %source.endpoint().root(),
        to = %destination.endpoint().root(),
        dry_run = cli.dry_run,
        "Starting migration"
    );

    let service = MigrationService::new(
        Arc::new(source),
        Arc::new(destination),
        MigrationOptions {
            dry_run: cli.dry_run,
        },
    );
    Ok(service.run().await?)
}

/// Report as printed on stdout with `--json`
fn render_json(report: &MigrationReport) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

fn print_report(report: &MigrationReport, dry_run: bool) {
    if dry_run {
        println!("🔎 Dry run finished");
    } else if !report.has_failures() {
        println!("✅ Migration finished");
    } else {
        println!("⚠️  Migration finished with failures");
    }
    println!("   📁 Collections: {}", report.collections);
    println!("   📄 Items found: {}", report.items_found);
    println!("   📤 Items copied: {}", report.items_copied);

    if report.has_failures() {
        println!("   ❌ Items refused: {}", report.failures.len());
        for failure in &report.failures {
            println!("      {}: {}", failure.href, failure.error);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let report = match migrate(&cli).await {
        Ok(report) => report,
        Err(e) => {
            error!("Migration aborted: {e:#}");
            return ExitCode::from(EXIT_FATAL);
        },
    };

    if cli.json {
        match render_json(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("Failed to render report: {e}");
                return ExitCode::from(EXIT_FATAL);
            },
        }
    } else {
        print_report(&report, cli.dry_run);
    }

    ExitCode::from(exit_status(&report, cli.fail_on_partial))
}
