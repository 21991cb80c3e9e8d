//! Service entry point.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ashare_screener::config::Config;
use ashare_screener::ScreenerService;

#[tokio::main]
async fn main() -> Result<()> {
    // config first: it carries the default log filter
    let config = Config::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = config.server.host.as_str(),
        port = config.server.port,
        "starting ashare-screener"
    );

    ScreenerService::new(config).start().await
}
