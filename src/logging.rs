//! Diagnostic logging to stderr, filtered by `DOCCHAT_LOG` (default `warn`).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the log filter (`EnvFilter` syntax).
pub const LOG_ENV: &str = "DOCCHAT_LOG";

/// Install the global subscriber: stderr, filter from `DOCCHAT_LOG`,
/// `warn` when unset. Safe to call more than once.
pub fn init() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        init();
        init();
        tracing::warn!("still logging");
    }
}
