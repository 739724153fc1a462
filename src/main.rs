//! offline-mt - Offline Machine Translation
//!
//! Entry point: loads and validates configuration, wires the asset pipeline
//! and backend chain, then runs the requested command.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use offline_mt::assets::{progress, AssetPipeline, HttpFetcher, StagePaths};
use offline_mt::cli::{Args, Commands};
use offline_mt::config::Config;
use offline_mt::error::MtError;
use offline_mt::translate::{BackendFactory, ChainTranslator};

const DEFAULT_CONFIG: &str = "offline-mt.toml";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging to both console and file
    setup_logging(args.verbose)?;

    // Load and validate configuration before anything touches disk or network
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new(DEFAULT_CONFIG).exists() {
                info!("Found {} in current directory, loading...", DEFAULT_CONFIG);
                Config::from_file(DEFAULT_CONFIG)?
            } else {
                Config::default()
            }
        }
    };
    config.apply_env()?;
    let catalog = Arc::new(config.catalog()?);

    let fetcher = HttpFetcher::new(&config.assets.user_agent).map_err(|e| anyhow::anyhow!("HTTP client: {}", e))?;
    let pipeline = Arc::new(AssetPipeline::new(
        catalog,
        StagePaths::new(&config.assets.root),
        Box::new(fetcher),
        progress::for_environment(config.assets.log_every_bytes),
    ));
    let chain = BackendFactory::create_chain(&config, pipeline.clone());

    match args.command {
        Commands::Translate { src, tgt, text } => {
            if text.is_empty() {
                let mut lines = BufReader::new(tokio::io::stdin()).lines();
                while let Some(line) = lines.next_line().await? {
                    println!("{}", translate(&chain, &line, &src, &tgt).await?);
                }
            } else {
                println!("{}", translate(&chain, &text.join(" "), &src, &tgt).await?);
            }
        }
        Commands::Status { json } => {
            let mut rows = Vec::new();
            for id in pipeline.catalog().ids() {
                rows.push((id.to_string(), pipeline.status(id).map_err(MtError::from)?));
            }

            if json {
                let value: serde_json::Map<String, serde_json::Value> = rows
                    .iter()
                    .map(|(id, status)| Ok((id.clone(), serde_json::to_value(status)?)))
                    .collect::<std::result::Result<_, serde_json::Error>>()?;
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{:<20} {:<12} {:<40}", "Asset", "Status", "Source");
                println!("{}", "-".repeat(72));
                for (id, status) in &rows {
                    let url = pipeline.catalog().get(id).map(|d| d.url.as_str()).unwrap_or_default();
                    println!("{:<20} {:<12} {:<40}", id, status, url);
                }
            }
        }
        Commands::Provision { ids } => {
            if ids.is_empty() {
                for backend in chain.backends() {
                    info!("Provisioning backend {}", backend.name());
                    backend.provision().await.map_err(MtError::from)?;
                }
            } else {
                for id in &ids {
                    pipeline.ensure(id).await.map_err(MtError::from)?;
                }
            }
            info!("Provisioning completed successfully");
        }
        Commands::Backends => {
            println!("{:<4} {:<20} {:<16}", "#", "Backend", "State");
            println!("{}", "-".repeat(40));
            for (idx, backend) in chain.backends().iter().enumerate() {
                println!("{:<4} {:<20} {:<16}", idx + 1, backend.name(), backend.state().to_string());
            }
        }
    }

    Ok(())
}

async fn translate(chain: &ChainTranslator, text: &str, src: &str, tgt: &str) -> Result<String> {
    Ok(chain.translate(text, src, tgt).await.map_err(MtError::from)?)
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".offline-mt").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "offline-mt.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    // Console goes to stderr so translations on stdout stay clean
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}", log_level, log_dir.join("offline-mt.log").display());

    Ok(())
}
