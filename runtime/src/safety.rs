//! Bounds violation tracking and reporting
//!
//! Every failed element access check goes through [`report_violation`], which
//! logs the offending access and bumps a process-wide counter. The exported
//! check function then terminates the process; in-process callers (the MIR
//! interpreter, tests) only observe the returned [`BoundsViolation`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for bounds violations
static BOUNDS_VIOLATION_COUNT: AtomicU64 = AtomicU64::new(0);

/// An element access outside `[0, capacity)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundsViolation {
    pub offset: i32,
    pub capacity: i32,
}

impl BoundsViolation {
    /// True when the access was before the start of the array
    pub fn is_underflow(&self) -> bool {
        self.offset < 0
    }
}

impl fmt::Display for BoundsViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_underflow() {
            write!(f, "negative element offset {} (capacity {})", self.offset, self.capacity)
        } else {
            write!(
                f,
                "element offset {} out of bounds for capacity {}",
                self.offset, self.capacity
            )
        }
    }
}

impl std::error::Error for BoundsViolation {}

/// Report a bounds violation
///
/// Logs the violation and increments the global counter. With the
/// `panic-on-safety-violation` feature it panics instead of returning.
pub fn report_violation(violation: BoundsViolation) {
    let count = BOUNDS_VIOLATION_COUNT.fetch_add(1, Ordering::SeqCst);

    log::error!("[BOUNDS VIOLATION #{:04}] {}", count + 1, violation);

    #[cfg(feature = "panic-on-safety-violation")]
    {
        panic!("Bounds violation detected: {}", violation);
    }
}

/// Get total count of bounds violations
pub fn violation_count() -> u64 {
    BOUNDS_VIOLATION_COUNT.load(Ordering::SeqCst)
}
