//! Structured logging setup.
//!
//! Console output goes to stderr through a compact layer. With verbose
//! mode on, a second non-ANSI layer appends to `vne.log` in the working
//! directory so a run leaves an inspectable trail.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILE: &str = "vne.log";

/// Initialize the global subscriber. Returns a guard that must stay alive
/// for the file writer to flush; None when verbose logging is off.
///
/// `RUST_LOG` overrides the default `info` filter.
pub fn init(verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    if verbose {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(LOG_FILE)
            .with_context(|| format!("open {LOG_FILE}"))?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_target(true);

        let init_result = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init();
        if let Err(e) = init_result {
            // Tests and embedders may have installed a subscriber already.
            if !e.to_string().contains("already been set") {
                return Err(e.into());
            }
        }
        Ok(Some(guard))
    } else {
        let init_result = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init();
        if let Err(e) = init_result {
            if !e.to_string().contains("already been set") {
                return Err(e.into());
            }
        }
        Ok(None)
    }
}
