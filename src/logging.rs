//! Tracing subscriber setup
//!
//! The terminal belongs to the editor while it runs, so logs only ever go to
//! a file. Filtering follows `TILDE_LOG` (same syntax as `RUST_LOG`), INFO by
//! default.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{Result, TermError};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "TILDE_LOG";

/// Install the global subscriber, writing to `log_file_path`
pub fn init_global(log_file_path: &Path) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|source| TermError::Io {
        op: "create log file",
        source,
    })?;

    build_subscriber(log_file)
        .try_init()
        .map_err(|e| TermError::Config(format!("logging: {e}")))
}

/// Subscriber writing plain-text lines to `log_file`
pub fn build_subscriber(log_file: File) -> impl tracing::Subscriber + Send + Sync {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();

    let fmt_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry().with(fmt_layer).with(env_filter)
}
