//! Tracing subscriber setup for Sightline binaries.
//!
//! Library crates only emit `tracing` spans and events; whoever owns `main`
//! calls [`init_logging`] once to decide where they go.

use std::path::{Path, PathBuf};

use sightline_config::Config;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt};

/// Filter used when neither `RUST_LOG` nor the config names a level.
pub const DEFAULT_FILTER: &str = "info,sightline_visibility=info";

/// File name of the JSON log written in debug builds.
pub const LOG_FILE_NAME: &str = "sightline.log";

/// Filter directive string derived from the config's log level, falling back
/// to [`DEFAULT_FILTER`] when the level is unset or blank.
pub fn filter_directives(config: Option<&Config>) -> String {
    match config {
        Some(config) if !config.debug.log_level.trim().is_empty() => {
            config.debug.log_level.trim().to_string()
        }
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Install the global tracing subscriber.
///
/// Console output carries uptime, target, level and thread name. In debug
/// builds with a `log_dir`, a JSON copy of every event is also written to
/// [`LOG_FILE_NAME`] inside it. `RUST_LOG` takes precedence over the config.
///
/// Returns the path of the JSON log when one was opened, or an error when a
/// global subscriber is already installed.
pub fn init_logging(
    log_dir: Option<&Path>,
    debug_build: bool,
    config: Option<&Config>,
) -> Result<Option<PathBuf>, TryInitError> {
    let directives = filter_directives(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true) // pool workers are named
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
    {
        let log_path = log_dir.join(LOG_FILE_NAME);
        if let Ok(log_file) = std::fs::File::create(&log_path) {
            let file_layer = fmt::layer()
                .with_writer(log_file)
                .with_ansi(false)
                .with_target(true)
                .with_timer(fmt::time::uptime())
                .json();

            subscriber.with(file_layer).try_init()?;
            return Ok(Some(log_path));
        }
    }

    subscriber.try_init()?;
    Ok(None)
}

/// An `EnvFilter` built from [`DEFAULT_FILTER`].
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
