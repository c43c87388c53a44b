//! Unified error interface for cogsim.
//!
//! Every error enum in the workspace implements [`ErrorCode`] so the
//! controller, the harness and the CLI can report failures uniformly.
//!
//! # Example
//!
//! ```
//! use cogsim_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum LinkError {
//!     Closed,
//!     Timeout,
//! }
//!
//! impl ErrorCode for LinkError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Closed => "LINK_CLOSED",
//!             Self::Timeout => "LINK_TIMEOUT",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Timeout)
//!     }
//! }
//!
//! assert_eq!(LinkError::Timeout.code(), "LINK_TIMEOUT");
//! assert!(!LinkError::Closed.is_recoverable());
//! ```

/// Machine-readable error code plus recoverability.
///
/// # Code Format
///
/// - UPPER_SNAKE_CASE
/// - prefixed by layer: `MODEL_`, `FIRING_`, `DISPATCH_`, `CONNECTOR_`, ...
/// - stable once published
///
/// # Recoverability
///
/// An error is recoverable when repeating the operation may succeed
/// (a timeout, a full queue). Definition errors, authentication failures
/// and aborted models are not.
pub trait ErrorCode {
    /// Returns the machine-readable error code.
    fn code(&self) -> &'static str;

    /// Returns whether retrying may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that an error code is non-empty, prefixed and UPPER_SNAKE_CASE.
///
/// # Panics
///
/// Panics with a descriptive message if any check fails.
///
/// ```
/// use cogsim_types::{assert_error_code, ErrorCode};
///
/// struct Full;
/// impl ErrorCode for Full {
///     fn code(&self) -> &'static str { "QUEUE_FULL" }
///     fn is_recoverable(&self) -> bool { true }
/// }
///
/// assert_error_code(&Full, "QUEUE_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );
    assert!(
        is_upper_snake_case(code),
        "Error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Runs [`assert_error_code`] over every variant in `errors`.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }
    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum ProbeError {
        Busy,
        Broken,
    }

    impl ErrorCode for ProbeError {
        fn code(&self) -> &'static str {
            match self {
                Self::Busy => "PROBE_BUSY",
                Self::Broken => "PROBE_BROKEN",
            }
        }

        fn is_recoverable(&self) -> bool {
            matches!(self, Self::Busy)
        }
    }

    #[test]
    fn codes_and_recoverability() {
        assert_eq!(ProbeError::Busy.code(), "PROBE_BUSY");
        assert!(ProbeError::Busy.is_recoverable());
        assert!(!ProbeError::Broken.is_recoverable());
    }

    #[test]
    fn all_variants_conform() {
        assert_error_codes(&[ProbeError::Busy, ProbeError::Broken], "PROBE_");
    }

    #[test]
    #[should_panic(expected = "must start with prefix")]
    fn wrong_prefix_panics() {
        assert_error_code(&ProbeError::Busy, "MODEL_");
    }

    #[test]
    fn snake_case_detection() {
        assert!(is_upper_snake_case("A"));
        assert!(is_upper_snake_case("MODEL_UNKNOWN_BUFFER"));
        assert!(is_upper_snake_case("LOCK_2"));
        assert!(!is_upper_snake_case(""));
        assert!(!is_upper_snake_case("model"));
        assert!(!is_upper_snake_case("_LOCK"));
        assert!(!is_upper_snake_case("LOCK_"));
        assert!(!is_upper_snake_case("LOCK__HELD"));
    }
}
