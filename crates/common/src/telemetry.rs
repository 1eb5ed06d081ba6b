//! Log stream set-up and per-component observability handles.
//!
//! Components never reach for a global logger. Each one is handed a
//! [`tracing::Span`] when it is constructed and emits its events with
//! `parent: &span`, so every record carries the component that produced it.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::{LogConfig, LogFormat};

/// Install the global subscriber: stdout plus an optional JSON file mirror.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let stdout = match config.format {
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Pretty => fmt::layer().with_target(false).boxed(),
    };

    let mut file_error = None;
    let file = config.path.as_ref().and_then(|path| {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                file_error = Some(e);
                return None;
            }
        }
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                file_error = Some(e);
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .try_init()?;

    if let (Some(path), Some(e)) = (config.path.as_ref(), file_error) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "Failed to open log file, logging to stdout only"
        );
    }

    Ok(())
}

/// Build the observability handle for one component.
pub fn component_span(component: &'static str) -> Span {
    tracing::info_span!("component", name = component)
}
