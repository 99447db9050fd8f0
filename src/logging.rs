//! Tracing subscriber setup for the binary
//!
//! The library only emits events; installing a subscriber is left to the
//! binary (or to tests that want to see output).

use anyhow::{anyhow, Result};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Install a global subscriber writing to stderr
///
/// `RUST_LOG` wins over `default_directive` when it is set.
pub fn setup_logging(default_directive: &str) -> Result<()> {
    setup_logging_with_writer(default_directive, std::io::stderr)
}

pub fn setup_logging_with_writer<W>(default_directive: &str, writer: W) -> Result<()>
where
    W: for<'writer> fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .map_err(|e| anyhow!("invalid log filter '{}': {}", default_directive, e))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_thread_ids(false)
                .compact(),
        )
        .try_init()
        .map_err(|e| anyhow!(e))?;
    Ok(())
}
