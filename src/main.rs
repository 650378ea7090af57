#![allow(non_snake_case)]

use meetingReminderBot::cli;
use meetingReminderBot::config::AppConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "unable to read CONFIG_FILE");
            std::process::exit(2);
        }
    };

    if let Err(err) = cli::cli(config).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}
