use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::cli::LogFormat;

/// Install the global subscriber: stderr in the chosen format plus an
/// optional plain-text log file. Never fails; problems are logged.
pub fn init(level: Option<&str>, format: LogFormat, file: Option<&Path>) {
    let mut problems = Vec::new();

    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|e| {
            problems.push(format!("Invalid log level '{}': {}", level, e));
            EnvFilter::new("info")
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let stderr_layer = match format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let file_layer = file.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(handle) => Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(handle))
                    .boxed(),
            ),
            Err(e) => {
                problems.push(format!("Cannot open log file {}: {}", path.display(), e));
                None
            }
        }
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    for problem in problems {
        warn!("{}", problem);
    }
}
