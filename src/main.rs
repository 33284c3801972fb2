use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rate_scout::scrapers::AdapterRegistry;
use rate_scout::{Config, Database, PriceTracker, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting competitor price tracker");

    let config = Config::from_env()?;
    config.log_summary();

    if let Some(dir) = config
        .database_url
        .strip_prefix("sqlite:")
        .and_then(|path| std::path::Path::new(path).parent())
        .filter(|dir| !dir.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    let database = Database::new(&config.database_url).await?;
    let adapters = AdapterRegistry::build(&config.adapters, |kind| config.fetch.build_client(kind))?;
    let tracker = PriceTracker::new(
        Arc::new(adapters),
        Arc::new(database),
        config.tracker,
        config.pacing,
    );

    let scheduler = Scheduler::start(tracker, &config.schedule).await?;

    if config.run_on_start {
        info!("Running initial price check");
        scheduler.spawn_now();
    }

    info!("Waiting for scheduled checks, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    scheduler.shutdown().await
}
