//! Tracing subscriber setup for the binaries.
//!
//! The library only emits `tracing` events; nothing is printed unless a
//! subscriber is installed. `RUST_LOG` overrides the default `info` filter.

use std::io::IsTerminal;

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Install a global fmt subscriber writing to stderr.
///
/// # Errors
///
/// Returns an error if a global subscriber is already set.
pub fn init_tracing() -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);
    Registry::default().with(filter).with(fmt_layer).try_init()
}
