//! Logging macros for the rotation engine with verbosity level control.
//!
//! Provides zero-cost logging when disabled (verbosity=0).
//! Verbosity levels:
//! - 0: SILENT (only errors and unresolved diagnostics)
//! - 1: CHANGES (break placements, repairs applied, reassignments)
//! - 2: CHECKS (candidate consideration, rejected repairs)
//! - 3: DEBUG (full algorithm internals, per-slot scoring)

/// Verbosity level constants.
pub const VERBOSITY_SILENT: u8 = 0;
pub const VERBOSITY_CHANGES: u8 = 1;
pub const VERBOSITY_CHECKS: u8 = 2;
pub const VERBOSITY_DEBUG: u8 = 3;

/// Log unconditionally.
///
/// Used for: unfillable cells, eligibility lookup failures, violations left
/// after the aggressive balancing pass.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        eprintln!($($arg)*);
    };
}

/// Log at CHANGES level (verbosity >= 1).
///
/// Used for: break placements, applied repairs, absence reassignments.
#[macro_export]
macro_rules! log_changes {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHANGES {
            eprintln!($($arg)*);
        }
    };
}

/// Log at CHECKS level (verbosity >= 2).
///
/// Used for: candidate consideration, skip reasons, rejected repair moves.
#[macro_export]
macro_rules! log_checks {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_CHECKS {
            eprintln!($($arg)*);
        }
    };
}

/// Log at DEBUG level (verbosity >= 3).
///
/// Used for: priority scores, station scoring, per-slot internals.
#[macro_export]
macro_rules! log_debug {
    ($verbosity:expr, $($arg:tt)*) => {
        if $verbosity >= $crate::logging::VERBOSITY_DEBUG {
            eprintln!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_ordering() {
        assert!(VERBOSITY_SILENT < VERBOSITY_CHANGES);
        assert!(VERBOSITY_CHANGES < VERBOSITY_CHECKS);
        assert!(VERBOSITY_CHECKS < VERBOSITY_DEBUG);
    }

    #[test]
    fn test_log_macros_compile() {
        let verbosity = VERBOSITY_SILENT;
        log_changes!(verbosity, "slot {}", 1);
        log_checks!(verbosity, "slot {}", 2);
        log_debug!(verbosity, "slot {}", 3);
    }
}
