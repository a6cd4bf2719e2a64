mod config;
mod job;
mod outbox;
mod publish;
mod telemetry;
mod version;
mod web;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use chime_core::TimeStore;
use clap::Parser;
use tracing::info;

use crate::{
    config::{open_config, write_default_config},
    job::{ChimeJob, Debounce},
    publish::Publisher,
    telemetry::ChimeMetrics,
    version::short_version,
};

#[derive(Parser)]
#[command(version = short_version())]
struct Args {
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.init {
        write_default_config(&args.config)?;
        info!(path = ?args.config, "Created default configuration");
        return Ok(());
    }

    info!(version = short_version(), "chimebot version");

    let config = open_config(&args.config).context("Failed to load configuration")?;
    info!(towers = config.towers.len(), "Configuration loaded");

    let store = TimeStore::open_path(&config.database.path)
        .await
        .with_context(|| format!("Failed to open time store: {}", config.database.path.display()))?;

    let metrics = ChimeMetrics::new();

    for tower in &config.towers {
        let publishers = tower
            .publishers
            .iter()
            .map(|p| Publisher::from_config(p, &tower.id))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Failed to set up publishers for tower '{}'", tower.id))?;

        let job = ChimeJob::new(
            tower.clone(),
            store.clone(),
            publishers,
            Debounce::new(config.schedule.debounce),
            metrics.clone(),
        );
        tokio::spawn(job.run());
    }

    if config.server.enabled {
        let state = web::AppState::new(&config, store.clone(), metrics);
        let server = web::bind(config.server.bind, state)?;
        tokio::spawn(server);
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    store.close().await;

    Ok(())
}
