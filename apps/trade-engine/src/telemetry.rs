//! Tracing setup.
//!
//! Console subscriber with `RUST_LOG`-style filtering. Structured fields on
//! every engine event; pretty ANSI output is left to the environment.

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_telemetry() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init();
}
