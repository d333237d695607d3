//! Coco Runtime Library
//!
//! Runtime support linked into instrumented programs. The bounds-check
//! instrumentation pass emits a call to [`__coco_check_bounds`] in front of
//! every checked element access, passing the element offset first and the
//! array capacity second.

pub mod safety;

pub use safety::{report_violation, violation_count, BoundsViolation};

/// Exit status of a process terminated by a failed bounds check (`EINVAL`)
pub const BOUNDS_VIOLATION_EXIT_CODE: i32 = 22;

/// Symbol name of the check function as seen by instrumented code
pub const CHECK_BOUNDS_SYMBOL: &str = "__coco_check_bounds";

/// Check an element offset against an array capacity.
///
/// Succeeds when `0 <= offset < capacity`.
#[inline]
pub fn check_bounds(offset: i32, capacity: i32) -> Result<(), BoundsViolation> {
    if offset < 0 || offset >= capacity {
        return Err(BoundsViolation { offset, capacity });
    }
    Ok(())
}

/// Bounds check entry point called by instrumented code.
///
/// Terminates the process with [`BOUNDS_VIOLATION_EXIT_CODE`] when the offset
/// is outside `[0, capacity)`; otherwise has no observable effect.
#[no_mangle]
pub extern "C" fn __coco_check_bounds(offset: i32, capacity: i32) {
    if let Err(violation) = check_bounds(offset, capacity) {
        report_violation(violation);
        std::process::exit(BOUNDS_VIOLATION_EXIT_CODE);
    }
}
