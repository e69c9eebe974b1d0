//! Tracing setup: pretty or JSON console output plus an optional JSON-lines
//! file sink with rotation.

use crate::cli::FILE_GUARD;
use kegmeter_config::Logging;
use std::path::Path;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

/// Install the global subscriber. `RUST_LOG` overrides the console level.
pub fn init(console_level: &str, json: bool, logging: &Logging) -> eyre::Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(console_level))
        .map_err(|e| eyre::eyre!("invalid log level {console_level:?}: {e}"))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    if json {
        layers.push(
            fmt::layer()
                .json()
                .with_target(false)
                .with_filter(console_filter)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .with_target(false)
                .with_filter(console_filter)
                .boxed(),
        );
    }

    if let Some(file) = &logging.file {
        let path = Path::new(file);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file has no file name: {file:?}"))?;
        let dir = dir.unwrap_or_else(|| Path::new("."));

        let appender = match logging.rotation.as_deref() {
            Some("daily") => rolling::daily(dir, name),
            Some("hourly") => rolling::hourly(dir, name),
            None | Some("never") => rolling::never(dir, name),
            Some(other) => eyre::bail!("logging.rotation must be never|daily|hourly, got {other:?}"),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        // Guard must outlive main so buffered lines get flushed.
        let _ = FILE_GUARD.set(guard);

        let file_level = logging.level.as_deref().unwrap_or("info");
        let file_filter = EnvFilter::try_new(file_level)
            .map_err(|e| eyre::eyre!("invalid logging.level {file_level:?}: {e}"))?;
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}
