//! Security subsystem errors.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`SecurityError::Io`] | `SECURITY_IO` | No |
//! | [`SecurityError::Key`] | `SECURITY_KEY` | No |
//! | [`SecurityError::Registry`] | `SECURITY_REGISTRY` | No |
//! | [`SecurityError::Signing`] | `SECURITY_SIGNING` | No |
//! | [`SecurityError::UnknownSigner`] | `SECURITY_UNKNOWN_SIGNER` | No |

use cascade_types::{ErrorCode, Severity, SignerId};
use std::path::PathBuf;
use thiserror::Error;

/// Error from digesting, key handling, or the signer registry.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// A file or directory could not be read or written.
    #[error("security i/o error at {path}: {source}")]
    Io {
        /// The offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A key could not be generated, parsed, or encoded.
    #[error("key error: {reason}")]
    Key {
        /// What went wrong.
        reason: String,
    },

    /// The trusted-signers registry is malformed.
    #[error("trusted signers registry {path}: {reason}")]
    Registry {
        /// Registry file path.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Producing a signature failed.
    #[error("signing failed: {reason}")]
    Signing {
        /// What went wrong.
        reason: String,
    },

    /// A signer id is not present in the registry.
    #[error("unknown signer '{signer}'")]
    UnknownSigner {
        /// The missing signer id.
        signer: SignerId,
    },
}

impl SecurityError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn key(reason: impl Into<String>) -> Self {
        Self::Key {
            reason: reason.into(),
        }
    }
}

impl ErrorCode for SecurityError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "SECURITY_IO",
            Self::Key { .. } => "SECURITY_KEY",
            Self::Registry { .. } => "SECURITY_REGISTRY",
            Self::Signing { .. } => "SECURITY_SIGNING",
            Self::UnknownSigner { .. } => "SECURITY_UNKNOWN_SIGNER",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn severity(&self) -> Severity {
        Severity::Security
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_types::assert_error_codes;

    #[test]
    fn error_codes() {
        assert_error_codes(
            &[
                SecurityError::io("p", std::io::Error::other("x")),
                SecurityError::key("bad pem"),
                SecurityError::Registry {
                    path: "p".into(),
                    reason: "x".into(),
                },
                SecurityError::Signing { reason: "x".into() },
                SecurityError::UnknownSigner {
                    signer: "who".parse().unwrap(),
                },
            ],
            "SECURITY_",
        );
    }

    #[test]
    fn security_severity_maps_to_exit_code_2() {
        assert_eq!(SecurityError::key("x").severity().exit_code(), 2);
    }
}
