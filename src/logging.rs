// ABOUTME: Logging setup using tracing + tracing-subscriber
// ABOUTME: Level comes from WEFT_LOG or defaults to info

use tracing_subscriber::fmt;
use tracing_subscriber::EnvFilter;

/// Initialise the global tracing subscriber.
///
/// The filter comes from the `WEFT_LOG` environment variable (same
/// syntax as `RUST_LOG`), defaulting to `info`. Call once at startup;
/// embedding applications that install their own subscriber should skip
/// this.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env("WEFT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
