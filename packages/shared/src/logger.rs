//! Logging setup utilities for the Hiroba binaries.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber with the specified default log level.
///
/// The filter covers the workspace crates and the binary itself. `RUST_LOG`
/// takes precedence when it is set.
///
/// # Arguments
///
/// * `binary_name` - The name of the binary (e.g., "hiroba-server", "hiroba-client")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
///
/// # Examples
///
/// ```no_run
/// use hiroba_shared::logger::setup_logger;
///
/// setup_logger("hiroba-server", "debug");
/// ```
pub fn setup_logger(binary_name: &str, default_log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(binary_name, default_log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the default `EnvFilter` directive string.
fn default_filter(binary_name: &str, level: &str) -> String {
    let binary_target = binary_name.replace('-', "_");
    ["hiroba_shared", "hiroba_server", "hiroba_client", "tower_http"]
        .iter()
        .map(|target| format!("{}={}", target, level))
        .chain(std::iter::once(format!("{}={}", binary_target, level)))
        .collect::<Vec<_>>()
        .join(",")
}
