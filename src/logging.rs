//! Tracing subscriber setup.
//!
//! Human-readable events go to stderr, filtered by `LEADREP_LOG` if set,
//! else by the configured level, else `info`. With a log file configured,
//! every event is also appended there as one JSON object per line.
//!
//! Per-candidate events carry `candidate`, `position`, `total`,
//! `duration_ms` and `outcome`; retries add `attempt` and `delay_ms`.

use std::io::IsTerminal;
use std::path::Path;
use std::sync::Once;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

const DEFAULT_LOG_LEVEL: &str = "info";
pub const ENV_VAR_NAME: &str = "LEADREP_LOG";

static INIT: Once = Once::new();

/// Install the global subscriber. Only the first call has any effect.
pub fn init(log_level: Option<&str>, log_file: Option<&Path>) -> anyhow::Result<()> {
    let mut init_err: Option<anyhow::Error> = None;

    INIT.call_once(|| {
        if let Err(e) = try_init(log_level, log_file) {
            init_err = Some(e);
        }
    });

    match init_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn try_init(log_level: Option<&str>, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = build_filter(std::env::var(ENV_VAR_NAME).ok().as_deref(), log_level);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .compact();

    let result: Result<(), TryInitError> = match log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file.with_max_level(Level::DEBUG))
                .with_target(false)
                .with_ansi(false)
                .json();

            tracing_subscriber::registry()
                .with(stderr_layer.with_filter(filter))
                .with(file_layer)
                .try_init()
        }
        None => tracing_subscriber::registry()
            .with(stderr_layer.with_filter(filter))
            .try_init(),
    };

    result.map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

/// `env_directive` wins when it parses; an invalid one falls back to the
/// configured level.
fn build_filter(env_directive: Option<&str>, log_level: Option<&str>) -> EnvFilter {
    env_directive
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(log_level.unwrap_or(DEFAULT_LOG_LEVEL)))
}

fn open_log_file(path: &Path) -> anyhow::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!(
                    "failed to create log file directory {}: {e}",
                    parent.display()
                )
            })?;
        }
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| anyhow::anyhow!("failed to open log file {}: {e}", path.display()))
}
