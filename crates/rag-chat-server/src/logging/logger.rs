use anyhow::Result;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

/// `<dir>/chat.<YYYY-MM-DD>.log`, rotated daily.
fn file_appender(dir: impl AsRef<std::path::Path>) -> Result<RollingFileAppender> {
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("chat")
        .filename_suffix("log")
        .build(dir)?)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logger(config: &LoggingConfig) -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone());
    let filter = EnvFilter::try_new(&log_level)?;

    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);

    match config.format {
        LogFormat::Json => layers.push(
            fmt::layer()
                .json()
                .with_writer(std::io::stdout)
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .boxed(),
        ),
        LogFormat::Pretty => layers.push(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(true)
                .with_level(true)
                .boxed(),
        ),
    }

    if let Some(dir) = &config.directory {
        let file_appender = file_appender(dir)?;

        let file_layer = match config.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_writer(file_appender)
                .with_target(true)
                .with_thread_ids(true)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .with_writer(file_appender)
                .with_target(true)
                .with_ansi(false)
                .boxed(),
        };
        layers.push(file_layer);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    Ok(())
}
