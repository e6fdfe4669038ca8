// src/main.rs
use anyhow::{Context, Result};
use chrono::Local;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

mod batch;
mod config;
mod period;
mod timewatch;

mod config_tests;

use batch::{run_batch, BatchSummary};
use config::{resolve_credentials, FillSettings};
use period::previous_month;
use timewatch::TimeWatchClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file (for local development)
    dotenv::dotenv().ok();

    let settings = FillSettings::default();

    // Logs go to stderr so the final JSON summary on stdout stays parseable.
    let subscriber = FmtSubscriber::builder()
        .with_max_level(settings.log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Setting tracing subscriber failed")?;

    info!("=== TimeWatch fill started ===");

    let records = resolve_credentials().context("Credential resolution failed")?;

    let today = Local::now().date_naive();
    let period = previous_month(today);

    let outcomes = run_batch(&records, period, || TimeWatchClient::new(settings.clone())).await;

    let summary = BatchSummary {
        period,
        processed: outcomes.len(),
        outcomes,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Serializing batch summary failed")?
    );

    info!(
        "=== TimeWatch fill finished. Processed {} users ===",
        summary.processed
    );
    Ok(())
}
