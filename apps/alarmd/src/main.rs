use std::sync::Arc;

use reveille_alarmd::config::DEFAULT_LOG_FILTER;
use reveille_alarmd::{Application, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_new(config.log_filter()).unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        environment = %config.environment(),
        mpd = %config.mpd().address(),
        stations = config.stations.len(),
        "Starting reveille alarm daemon"
    );

    let application = Arc::new(Application::from_config(&config)?);
    if let Err(e) = application.run().await {
        e.log();
        return Err(e.into());
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    application.shutdown();

    Ok(())
}
