use std::{
    fs::{self, File},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    config::RefrainConfig,
    hud::{HudHandler, TerminalUiBackend},
    service::NowPlayingService,
};

mod config;
mod error;
mod event;
mod hud;
mod lyrics;
mod model;
mod playback;
mod service;
mod source;
mod visibility;

/// Now playing pill with synced lyrics for the terminal
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Config file, defaults to ~/.config/refrain/config.toml
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Log file, defaults to refrain.log next to the config
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Poll every source once, print the result as JSON and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_file)?;

    let config = RefrainConfig::load(args.config.as_deref()).await?;
    let service = NowPlayingService::from_config(&config)?;

    if args.once {
        let result = service.poll_once().await;
        println!("{}", serde_json::to_string_pretty(&result.info)?);
        return Ok(());
    }

    tracing::info!("starting refrain");
    HudHandler::new(Arc::new(service), TerminalUiBackend::new())
        .run(Arc::new(config))
        .await
}

fn init_logging(path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => path,
        None => config::config_dir()?.join("refrain.log"),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::options().create(true).append(true).open(&path)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,refrain=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();
    Ok(())
}
