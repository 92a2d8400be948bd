//! cloudstore - chunked, encrypted transfers to S3-compatible object stores

mod commands;
mod progress;

use clap::Parser;
use cloudstore_core::{CloudStoreClient, EngineConfig};
use cloudstore_store::{HttpObjectStore, HttpStoreConfig};
use commands::Command;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cloudstore")]
#[command(about = "Chunked, encrypted transfers to S3-compatible object stores")]
#[command(version)]
struct Args {
    /// Store endpoint URL
    #[arg(long, global = true, default_value = "http://localhost:9000", env = "CLOUDSTORE_ENDPOINT")]
    endpoint: String,

    /// Bearer access token
    #[arg(long, global = true, env = "CLOUDSTORE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true, env = "CLOUDSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Key directory, may be repeated
    #[arg(long, global = true)]
    keydir: Vec<PathBuf>,

    /// Attempts per store request
    #[arg(long, global = true)]
    retry: Option<u32>,

    /// Concurrent part transfers per object
    #[arg(long, global = true)]
    part_workers: Option<usize>,

    /// Concurrent objects in recursive operations
    #[arg(long, global = true)]
    object_workers: Option<usize>,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value = "60")]
    timeout: u64,

    /// Enable debug logging
    #[arg(short, long, global = true, env = "CLOUDSTORE_DEBUG")]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = EngineConfig::load(self.config.as_deref())?;
        if !self.keydir.is_empty() {
            config.key_dirs = self.keydir.clone();
        }
        if let Some(retry) = self.retry {
            config.retry_count = retry;
        }
        if let Some(workers) = self.part_workers {
            config.part_workers = workers;
        }
        if let Some(workers) = self.object_workers {
            config.object_workers = workers;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(debug: bool, json: bool) {
    let log_level = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "cloudstore={0},cloudstore_core={0},cloudstore_store={0},cloudstore_cli={0}",
            log_level
        )
        .into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(args.debug, args.json_logs);

    let config = args.engine_config()?;

    // Key generation needs no store
    if let Command::Keygen { name, bits } = &args.command {
        return commands::keygen(&config, name, *bits);
    }

    let mut store_config =
        HttpStoreConfig::new(&args.endpoint).with_timeout(Duration::from_secs(args.timeout));
    if let Some(token) = &args.token {
        store_config = store_config.with_token(token);
    }
    tracing::debug!("Using store at {}", store_config.base_url());
    let store = HttpObjectStore::new(store_config)?;

    let client = CloudStoreClient::builder(Arc::new(store))
        .config(config)
        .build()?;

    commands::run(&client, args.command).await
}
