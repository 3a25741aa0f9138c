mod cache;
mod commands;
mod config;
mod fetch;
mod format;
mod logging;
mod market;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{KeyValueStore, MemoryStore, NoopStore, SqliteStore};
use crate::config::{CacheBackend, Config};
use crate::fetch::{Clock, SystemClock};
use crate::market::CachedMarketClient;

#[derive(Parser, Debug)]
#[command(name = "coinfetch")]
#[command(about = "Crypto market data from the command line, cached and rate-limit aware")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/coinfetch/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Don't read or write the persistent cache for this run
  #[arg(long, global = true)]
  no_cache: bool,

  /// More log output (-v debug, -vv trace)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  #[command(subcommand)]
  command: commands::Command,
}

/// Build the key-value store selected by config and flags.
fn open_store(config: &Config, no_cache: bool) -> Result<Arc<dyn KeyValueStore>> {
  if no_cache {
    return Ok(Arc::new(MemoryStore::new()));
  }

  let store: Arc<dyn KeyValueStore> = match config.cache.backend {
    CacheBackend::Sqlite => match &config.cache.path {
      Some(path) => Arc::new(SqliteStore::open(path)?),
      None => Arc::new(SqliteStore::open_default()?),
    },
    CacheBackend::Memory => Arc::new(MemoryStore::new()),
    CacheBackend::None => Arc::new(NoopStore),
  };
  Ok(store)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Keep the guard alive so file logs are flushed on exit
  let _log_guard = logging::init(&config.log, args.verbose)?;
  debug!(?config, "Loaded configuration");

  let store = open_store(&config, args.no_cache)?;
  let clock: Arc<dyn Clock> = Arc::new(SystemClock);
  let client = CachedMarketClient::new(&config, store, clock)?;

  commands::run(args.command, &client).await
}
