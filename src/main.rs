//! pg-sample-sync - Main entry point.
//!
//! Copies a PostgreSQL schema and a bounded sample of rows into a disposable
//! development database.

use clap::Parser;
use pg_sample_sync::config::Config;
use pg_sample_sync::db::PgConnector;
use pg_sample_sync::models::SyncReport;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout is reserved for the JSON report.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn log_summary(report: &SyncReport) {
    for table in &report.tables {
        info!(
            table = %table.table,
            status = ?table.status,
            rows_fetched = table.rows_fetched,
            rows_inserted = table.rows_inserted,
            failures = table.failures.len(),
            "Table summary"
        );
    }
    for failure in report.all_failures() {
        warn!(
            stage = %failure.stage,
            object = %failure.object,
            row = ?failure.row,
            "{}",
            failure.message
        );
    }
}

#[tokio::main]
async fn main() {
    // Values from .env fill in variables that are not already set
    dotenvy::dotenv().ok();

    let config = Config::parse();
    init_tracing(&config);

    info!("Starting pg-sample-sync v{}", env!("CARGO_PKG_VERSION"));

    let code = match pg_sample_sync::run(&config, PgConnector::from_settings).await {
        Ok(report) => {
            log_summary(&report);
            if config.report_json {
                match serde_json::to_string_pretty(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => error!(error = %e, "Failed to serialize report"),
                }
            }
            report.exit_code()
        }
        Err(e) => {
            match e.suggestion() {
                Some(suggestion) => error!(error = %e, suggestion = %suggestion, "Sync failed"),
                None => error!(error = %e, "Sync failed"),
            }
            e.exit_code()
        }
    };

    std::process::exit(code);
}
