//! Logging utilities for the serving core.
//!
//! The crate logs through the `log` facade. Embedders install whatever logger they like;
//! [`init_logger`] is a convenience for binaries and tests that just want `RUST_LOG` output.

/// Default filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "burn_central_serving=info";

/// Installs an `env_logger` reading `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
///
/// Returns `false` when a logger was already installed. Calling it again is harmless.
pub fn init_logger() -> bool {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_FILTER))
        .format_timestamp_millis()
        .try_init()
        .is_ok()
}

/// Same as [`init_logger`] but captured by the test harness.
pub fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
