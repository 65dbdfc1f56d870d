// Logging - tracing subscriber setup
//
// RUST_LOG, when set, wins over the configured level. Node output is logged
// under the `node` target, so `RUST_LOG=info,node=off` silences it.

use tracing_subscriber::EnvFilter;

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global fmt subscriber. Fails if one is already installed.
pub fn init(level: &str) -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(level))
        .try_init()
        .map_err(|e| e.to_string())
}

/// Subscriber for tests: captured by the test harness, safe to call repeatedly
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("warn"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_for_tests_is_idempotent() {
        init_for_tests();
        init_for_tests();
        assert!(init("debug").is_err());
    }
}
