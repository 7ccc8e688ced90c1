//! Engine-layer errors.
//!
//! Configuration-time failures from the loaders and the security
//! subsystem are wrapped transparently and keep their own codes and
//! severities; the engine adds the kinds that only exist at run
//! orchestration level.
//!
//! | Error | Code | Severity |
//! |-------|------|----------|
//! | [`EngineError::SecurityRejected`] | `ENGINE_SECURITY_REJECTED` | Security (2) |
//! | [`EngineError::NoSlotsRemain`] | `ENGINE_NO_SLOTS_REMAIN` | Security (2) |
//! | [`EngineError::NoFactory`] | `ENGINE_NO_FACTORY` | Config (3) |
//! | [`EngineError::PipelineNotFound`] | `ENGINE_PIPELINE_NOT_FOUND` | Config (3) |
//! | [`EngineError::ModuleFault`] | `ENGINE_MODULE_FAULT` | Pipeline (1) |
//! | [`EngineError::ShutdownTimeout`] | `ENGINE_SHUTDOWN_TIMEOUT` | Pipeline (1) |

use cascade_bus::BusError;
use cascade_manifest::{ManifestError, PipelineError};
use cascade_security::SecurityError;
use cascade_types::{ErrorCode, ModuleName, Severity, SlotId};
use std::path::PathBuf;
use thiserror::Error;

/// The module lifecycle hook a fault was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPhase {
    /// `initialise()`.
    Initialise,
    /// `on_input()`.
    OnInput,
    /// `iterate()`.
    Iterate,
    /// `teardown()`.
    Teardown,
}

impl std::fmt::Display for FaultPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initialise => "initialise",
            Self::OnInput => "on_input",
            Self::Iterate => "iterate",
            Self::Teardown => "teardown",
        };
        f.write_str(s)
    }
}

/// Engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A manifest failed to load or validate.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The pipeline failed to load or validate.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The security subsystem failed (I/O, keys, registry).
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// Wiring the bus failed.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// A slot was excluded by the admission policy.
    #[error("slot '{slot}' (module '{module}') rejected: module is {verdict}")]
    SecurityRejected {
        /// The rejected slot.
        slot: SlotId,
        /// Its module.
        module: ModuleName,
        /// Verdict label, e.g. `unsigned`.
        verdict: String,
    },

    /// Every slot of the pipeline was excluded.
    #[error("no slots remain after security exclusion")]
    NoSlotsRemain,

    /// A module has no registered constructor.
    #[error("no factory registered for module '{module}' (slot '{slot}')")]
    NoFactory {
        /// The slot being constructed.
        slot: SlotId,
        /// The module without a factory.
        module: ModuleName,
    },

    /// The named pipeline document does not exist.
    #[error("pipeline '{name}' not found at {path}")]
    PipelineNotFound {
        /// The requested pipeline name.
        name: String,
        /// The path probed.
        path: PathBuf,
    },

    /// A module hook raised an error.
    #[error("slot '{slot}' faulted in {phase}: {message}")]
    ModuleFault {
        /// The faulting slot.
        slot: SlotId,
        /// Which hook faulted.
        phase: FaultPhase,
        /// The module's error message.
        message: String,
    },

    /// A host exceeded the shutdown grace period and was force
    /// cancelled.
    #[error("slot '{slot}' exceeded the shutdown grace period")]
    ShutdownTimeout {
        /// The straggling slot.
        slot: SlotId,
    },
}

impl ErrorCode for EngineError {
    fn code(&self) -> &'static str {
        match self {
            Self::Manifest(e) => e.code(),
            Self::Pipeline(e) => e.code(),
            Self::Security(e) => e.code(),
            Self::Bus(e) => e.code(),
            Self::SecurityRejected { .. } => "ENGINE_SECURITY_REJECTED",
            Self::NoSlotsRemain => "ENGINE_NO_SLOTS_REMAIN",
            Self::NoFactory { .. } => "ENGINE_NO_FACTORY",
            Self::PipelineNotFound { .. } => "ENGINE_PIPELINE_NOT_FOUND",
            Self::ModuleFault { .. } => "ENGINE_MODULE_FAULT",
            Self::ShutdownTimeout { .. } => "ENGINE_SHUTDOWN_TIMEOUT",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Manifest(e) => e.is_recoverable(),
            Self::Pipeline(e) => e.is_recoverable(),
            Self::Security(e) => e.is_recoverable(),
            Self::Bus(e) => e.is_recoverable(),
            Self::ModuleFault { .. } => true,
            _ => false,
        }
    }

    fn severity(&self) -> Severity {
        match self {
            Self::Manifest(e) => e.severity(),
            Self::Pipeline(e) => e.severity(),
            Self::Security(e) => e.severity(),
            Self::Bus(e) => e.severity(),
            Self::SecurityRejected { .. } | Self::NoSlotsRemain => Severity::Security,
            Self::NoFactory { .. } | Self::PipelineNotFound { .. } => Severity::Config,
            Self::ModuleFault { .. } | Self::ShutdownTimeout { .. } => Severity::Pipeline,
        }
    }
}
