//! Logging bootstrap.
//!
//! The engine emits `tracing` events: `info` when a materialization starts and
//! finishes, `debug` at stage boundaries and file opens, `warn` for
//! recoverable anomalies. Nothing is printed until a subscriber is installed,
//! either by the application or with [`init`].

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns `false` when a global subscriber was already set, so calling it
/// twice (or after the application installed its own) is harmless.
pub fn init() -> bool {
    init_with(DEFAULT_FILTER)
}

/// As [`init`], with `fallback` used when `RUST_LOG` is unset.
pub fn init_with(fallback: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_a_no_op() {
        let _ = init();
        assert!(!init());
    }
}
