//! costsheet - Shape paginated cloud billing records into cost reports

use anyhow::Context;
use clap::Parser;
use costsheet::{
    cli::{Cli, parse_report_date},
    config::EngineConfig,
    engine::ReportEngine,
    output::get_formatter,
    replay::ReplayClient,
};
use costsheet_core::provider::CredentialBroker;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Reports may go to stdout, so logs always go to stderr.
    // The --quiet flag overrides RUST_LOG.
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("warn")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("costsheet=info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let today = match cli.today.as_deref() {
        Some(date) => parse_report_date(date)?,
        None => chrono::Local::now().date_naive(),
    };

    let mut config = EngineConfig::from_cli(&cli, today)?;
    config.show_progress = cli.progress && is_terminal::is_terminal(std::io::stderr());

    let client = Arc::new(
        ReplayClient::from_path(&cli.input)
            .await
            .with_context(|| format!("failed to load billing export {}", cli.input.display()))?,
    );
    let broker: Arc<dyn CredentialBroker> = client.clone();

    let mut engine = ReportEngine::new(config, client.clone(), client.as_ref(), Some(broker)).await?;
    engine.run_default_plan().await?;
    let collection = engine.into_collection();
    info!(
        "Built {} reports with {} warnings",
        collection.len(),
        collection.warnings().len()
    );

    let rendered = get_formatter(cli.json).format_collection(&collection);
    match &cli.output {
        Some(path) => {
            tokio::fs::write(path, rendered)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!("Reports written to {}", path.display());
        }
        None => println!("{rendered}"),
    }

    Ok(())
}
