//! `tracing_subscriber` initialization for the harness binary.

use std::env;

use tracing_subscriber::EnvFilter;

/// Configure a process-wide `tracing` subscriber: `RUST_LOG`-driven
/// filtering (defaulting to `info`), ANSI color honoring `NO_COLOR`/
/// `FORCE_COLOR` per https://no-color.org, timestamps on.
///
/// Idempotent within a process in the sense that a second call simply
/// fails to install (global default subscriber can only be set once);
/// callers in tests should not call this more than once per process.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let ansi = should_use_color();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(false)
        .try_init();
}

fn should_use_color() -> bool {
    if env::var_os("NO_COLOR").is_some() {
        false
    } else if env::var_os("FORCE_COLOR").is_some() {
        true
    } else {
        true
    }
}
