use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::Context;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::Config;

/// Installs the global tracing subscriber: console output routed through the
/// progress bars, plus a plain-text copy in `config.log_file` if set.
///
/// `RUST_LOG` takes precedence over the level implied by `config.verbose`.
pub fn init_logging(config: &Config) -> anyhow::Result<()> {
    let level = if config.verbose { "debug" } else { "info" };
    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(level)?,
    };

    let indicatif_layer = IndicatifLayer::new();

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(indicatif_layer.get_stderr_writer())
        .with_target(false);

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Couldn't open log file {path}"))?;

            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .with(indicatif_layer)
        .try_init()?;

    Ok(())
}
