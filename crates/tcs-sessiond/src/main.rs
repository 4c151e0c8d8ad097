use tcs_sessiond::config::DaemonConfig;
use tcs_sessiond::SessionDaemon;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration
    let config = if let Ok(path) = std::env::var("TCS_CONFIG_PATH") {
        DaemonConfig::from_toml(path)?
    } else {
        DaemonConfig::from_env()?
    };

    // Create and start daemon
    let daemon = SessionDaemon::new(config)?;
    daemon.start().await?;

    Ok(())
}
