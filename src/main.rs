//! krishi - Weather, market prices and crop advice for Kerala farmers

use std::io::{self, Write};

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use krishi::app::App;
use krishi::cli::Cli;
use krishi::config::AppConfig;
use krishi::render;

/// Logs go to stderr so stdout stays clean for `--json`
fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter());

    let mut config = AppConfig::load(cli.config.as_deref()).map_err(|e| {
        error!("{}", e);
        e
    })?;
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = Some(dir.clone());
    }

    let app = App::from_config(&config);
    let outcome = app.execute(&cli.command, cli.fetch_options()).await;

    let mut stdout = io::stdout().lock();
    if cli.json {
        render::write_json(&mut stdout, &outcome)?;
    } else {
        render::write_text(&mut stdout, &outcome, chrono::Utc::now())?;
    }
    stdout.flush()?;

    Ok(())
}
