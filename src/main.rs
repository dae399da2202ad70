//! rippl service binary
//!
//! Reads configuration from `RIPPL_CONFIG` (a JSON file) or the `RIPPL_*`
//! environment variables, optionally loaded from a `.env` file, and runs the
//! pipeline until SIGINT or SIGTERM.

use rippl::source::RedditClient;
use rippl::{Config, Supervisor};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "rippl failed to start");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> rippl::Result<()> {
    let config = match std::env::var("RIPPL_CONFIG") {
        Ok(path) if !path.trim().is_empty() => Config::from_json_file(Path::new(path.trim()))?,
        _ => Config::from_env()?,
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        sources = ?config.source_names(),
        terms = ?config.filter_terms.terms(),
        authenticated = config.reddit.credentials.is_some(),
        "Starting rippl"
    );

    let feed = Arc::new(RedditClient::new(&config.reddit)?);
    let sink = rippl::sink::from_config(&config.sink)?;
    let supervisor = Supervisor::new(&config, feed, sink)?;

    let intake = config.intake.as_ref().map(|intake| {
        let server = rippl::api::start_intake_server(
            intake.bind_address,
            supervisor.buffer(),
            supervisor.cancel_token(),
        );
        tokio::spawn(async move {
            if let Err(e) = server.await {
                tracing::error!(error = %e, "Intake server failed");
            }
        })
    });

    let cancel = supervisor.cancel_token();
    let report = rippl::run_until_signal(supervisor).await;
    // Also reached when every source failed on its own.
    cancel.cancel();

    if let Some(handle) = intake
        && let Err(e) = handle.await
    {
        tracing::error!(error = %e, "Intake server task failed");
    }

    for source in report.failed_sources() {
        tracing::warn!(source = %source, "Source stopped before shutdown");
    }
    tracing::info!(
        accepted = report.stats.accepted,
        dropped = report.stats.dropped,
        "rippl stopped"
    );
    Ok(())
}
