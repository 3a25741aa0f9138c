use color_eyre::{eyre::eyre, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Filter directive for the configured level and `-v` count.
///
/// Dependencies stay at `warn`; only this crate gets louder.
fn filter_directive(level: &str, verbosity: u8) -> String {
  let level = match verbosity {
    0 => level,
    1 => "debug",
    _ => "trace",
  };
  format!("warn,coinfetch={}", level)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the config file. When a log file is configured the
/// returned guard must be kept alive until exit so buffered lines get flushed.
pub fn init(config: &LogConfig, verbosity: u8) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(filter_directive(&config.level, verbosity)))
    .map_err(|e| eyre!("Invalid log level '{}': {}", config.level, e))?;

  match &config.file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| std::path::Path::new("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Log file path {} has no file name", path.display()))?;

      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

      let appender = tracing_appender::rolling::never(dir, file_name);
      let (writer, guard) = tracing_appender::non_blocking(appender);

      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

      Ok(None)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_config_level_without_flags() {
    assert_eq!(filter_directive("info", 0), "warn,coinfetch=info");
  }

  #[test]
  fn test_verbosity_overrides_config_level() {
    assert_eq!(filter_directive("warn", 1), "warn,coinfetch=debug");
    assert_eq!(filter_directive("warn", 3), "warn,coinfetch=trace");
  }

  #[test]
  fn test_directive_parses() {
    assert!(EnvFilter::try_new(filter_directive("info", 0)).is_ok());
  }
}
