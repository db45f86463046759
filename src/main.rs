use clap::Parser;
use tracing_subscriber::EnvFilter;

use fans_home_backend::cli::Cli;
use fans_home_backend::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    let config = AppConfig::from_env();

    // RUST_LOG 优先，否则使用 LOG_LEVEL
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .init();

    Cli::parse().execute(config).await
}
