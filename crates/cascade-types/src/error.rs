//! Unified error interface for cascade.
//!
//! Every error enum in the workspace implements [`ErrorCode`] so that
//! the engine can aggregate failures from any layer into a single run
//! report, and so tests can assert on stable machine-readable codes
//! instead of display strings.
//!
//! # Design
//!
//! - **Machine-readable codes**: `UPPER_SNAKE_CASE`, prefixed per layer
//!   (`TYPE_`, `MANIFEST_`, `PIPELINE_`, `SECURITY_`, `BUS_`, `ENGINE_`).
//!   Codes are an API contract and never change once defined.
//! - **Recoverability**: whether retrying the operation could succeed.
//! - **Severity**: which process exit code the error maps to. The
//!   engine's overall exit status is the worst severity encountered.
//!
//! # Example
//!
//! ```
//! use cascade_types::{ErrorCode, Severity};
//!
//! #[derive(Debug)]
//! enum MyError {
//!     Missing(String),
//!     Transient,
//! }
//!
//! impl ErrorCode for MyError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Missing(_) => "MY_MISSING",
//!             Self::Transient => "MY_TRANSIENT",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Transient)
//!     }
//!
//!     fn severity(&self) -> Severity {
//!         Severity::Pipeline
//!     }
//! }
//!
//! assert_eq!(MyError::Transient.code(), "MY_TRANSIENT");
//! assert_eq!(MyError::Transient.severity().exit_code(), 1);
//! ```

use serde::{Deserialize, Serialize};

/// Process-level severity of an error.
///
/// Severities are totally ordered; the engine reports the worst one it
/// saw during a run, and the CLI converts it into the process exit code.
///
/// | Severity | Exit code | Meaning |
/// |----------|-----------|---------|
/// | `None` | 0 | success |
/// | `Pipeline` | 1 | runtime failure inside an otherwise valid pipeline |
/// | `Security` | 2 | a module was rejected by the admission policy |
/// | `Config` | 3 | the run could not start (bad documents, bad flags) |
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Severity {
    /// No error.
    #[default]
    None,
    /// Runtime pipeline error.
    Pipeline,
    /// Security rejection.
    Security,
    /// Configuration error, surfaced before any module runs.
    Config,
}

impl Severity {
    /// Returns the process exit code for this severity.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Pipeline => 1,
            Self::Security => 2,
            Self::Config => 3,
        }
    }

    /// Returns the worse of two severities.
    ///
    /// `Config` outranks `Security` outranks `Pipeline` outranks `None`,
    /// matching the exit-code ordering.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        self.max(other)
    }
}

/// Unified error code interface.
///
/// Implemented by every error enum in the workspace.
///
/// # Code Format
///
/// - `UPPER_SNAKE_CASE`
/// - Prefixed with the owning layer (e.g. `BUS_`, `ENGINE_`)
/// - Stable across versions: changing a code is a breaking change
pub trait ErrorCode {
    /// Returns the stable machine-readable code for this error.
    fn code(&self) -> &'static str;

    /// Returns whether retrying the failed operation may succeed.
    fn is_recoverable(&self) -> bool;

    /// Returns the process-level severity of this error.
    fn severity(&self) -> Severity;
}

/// Asserts that an error code follows workspace conventions.
///
/// # Panics
///
/// Panics if the code is empty, lacks the expected prefix, or is not
/// `UPPER_SNAKE_CASE`.
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "error code '{code}' must start with prefix '{expected_prefix}'"
    );
    assert!(
        is_upper_snake_case(code),
        "error code '{code}' must be UPPER_SNAKE_CASE"
    );
}

/// Asserts conventions for every variant of an error enum at once.
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
