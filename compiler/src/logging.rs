//! Logging setup for the coco compiler, over `log` and `env_logger`.
//!
//! ```rust,ignore
//! coco_compiler::logging::init();                                  // warnings only
//! coco_compiler::logging::init_from_env();                         // honour RUST_LOG
//! coco_compiler::logging::init_with_level(log::LevelFilter::Debug);
//! ```
//!
//! Levels used by the instrumentation pass:
//!
//! - `warn!` - accesses left unchecked under the skip policy
//! - `debug!` - pass phases, rewritten signatures
//! - `trace!` - per-access offsets and capacities, the instrumented module dump
//!
//! Filter by module to follow a single pass:
//!
//! ```bash
//! RUST_LOG=coco_compiler::ir::bounds_check=trace cargo test
//! ```

use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;
use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize logging at `Warn`. Only the first initialization takes effect.
pub fn init() {
    init_with_level(LevelFilter::Warn);
}

/// Initialize logging at `level`, one `[LEVEL] target - message` line per record.
pub fn init_with_level(level: LevelFilter) {
    INIT.call_once(|| {
        let _ = Builder::new()
            .filter_level(level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{:5}] {} - {}",
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .try_init();
    });
}

/// Initialize logging from `RUST_LOG`, defaulting to `warn`.
pub fn init_from_env() {
    INIT.call_once(|| {
        let _ = Builder::from_env(env_logger::Env::default().default_filter_or("warn")).try_init();
    });
}

/// Initialize logging for tests: captured by the test harness, quiet unless
/// `RUST_LOG` asks for more. Safe to call from every test.
pub fn init_test() {
    let _ = Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

/// Whether [`init`], [`init_with_level`] or [`init_from_env`] has run
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
        log::trace!("offset of $3 in f = 4");
        log::warn!("leaving access unchecked");
    }

    #[test]
    fn test_init_marks_initialized() {
        init_with_level(LevelFilter::Debug);
        init();
        assert!(is_initialized());
    }
}
