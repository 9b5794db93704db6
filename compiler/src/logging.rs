//! Logging setup for the vectorizer
//!
//! Pass internals log through the `log` facade; `env_logger` is the backend.
//!
//! # Log Levels
//!
//! - `warn!` - an internal invariant was violated and a chain was skipped
//! - `debug!` - chain decisions, prefixed with `LSV:` (why a chain was split,
//!   rejected or rewritten)
//! - `trace!` - IR dumps of each block before and after rewriting
//!
//! # Environment Variable
//!
//! ```bash
//! RUST_LOG=lsv_compiler::ir::vectorization=debug cargo test
//! RUST_LOG=lsv_compiler=trace cargo bench
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging at `Warn`. Subsequent calls are no-ops.
pub fn init() {
    init_with_level(LevelFilter::Warn);
}

/// Initialize logging with a specific level. Subsequent calls are no-ops.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        Builder::new()
            .filter_level(level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{:5}] {} - {}",
                    record.level(),
                    record.module_path().unwrap_or("lsv"),
                    record.args()
                )
            })
            .init();
    });
}

/// Initialize logging from the `RUST_LOG` environment variable,
/// defaulting to `warn`.
pub fn init_from_env() {
    INIT.call_once(|| {
        Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    });
}

/// Initialize logging for tests.
///
/// Output goes through the test harness capture, so it only shows for
/// failing tests. `RUST_LOG` overrides the default `warn` filter.
pub fn init_test() {
    let _ = Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

/// Whether `init`, `init_with_level` or `init_from_env` has run.
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_is_idempotent() {
        init_test();
        init_test();
        log::debug!("LSV: logging ready");
    }
}
