use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::LogFormat;
use crate::error::ServerError;

const DEFAULT_FILTER: &str = "info";

/// Installs the global tracing subscriber.
///
/// Logs are appended to `log_file`. If it is empty or cannot be opened they go to
/// stderr instead. `RUST_LOG` overrides the default `info` filter.
pub fn init(format: LogFormat, log_file: &str) -> Result<(), ServerError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let mut fallback = None;
    let writer = if log_file.is_empty() {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        match OpenOptions::new().create(true).append(true).open(log_file) {
            Ok(file) => BoxMakeWriter::new(Mutex::new(file)),
            Err(err) => {
                fallback = Some(err);
                BoxMakeWriter::new(std::io::stderr)
            }
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer);
    let installed = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.with_ansi(false).try_init(),
    };
    installed.map_err(|err| ServerError::Logging(err.to_string()))?;

    if let Some(err) = fallback {
        tracing::warn!(log_file, %err, "could not open log file, logging to stderr");
    }
    Ok(())
}
