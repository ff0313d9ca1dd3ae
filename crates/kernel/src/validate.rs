//! Invariant checks for the scheduler.
//!
//! Violations abort in debug builds and whenever the `validation` feature is
//! enabled. Otherwise they are logged at error level and execution continues.

use std::fmt;

/// Whether invariant violations are fatal in this build.
pub const FATAL: bool = cfg!(any(debug_assertions, feature = "validation"));

/// Report a broken scheduler invariant.
#[track_caller]
pub fn violation(args: fmt::Arguments<'_>) {
    if FATAL {
        panic!("scheduler invariant violated: {args}");
    }
    tracing::error!("scheduler invariant violated: {args}");
}

/// Check a scheduler invariant, reporting through [`violation`] if it fails.
#[macro_export]
macro_rules! check_invariant {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::validate::violation(format_args!($($arg)+));
        }
    };
}
