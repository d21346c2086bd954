use anyhow::Context;
use clap::Parser;
use fpsmon::cli::{print_error, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = match cli.log_level() {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = cli
        .execute()
        .await
        .with_context(|| format!("config {}", cli.config_path().display()));

    if let Err(e) = result {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
