//! Configuration-time errors.
//!
//! Everything in this module is fatal for the affected document and is
//! surfaced before any module runs.
//!
//! # Error Code Convention
//!
//! | Error | Code |
//! |-------|------|
//! | [`ManifestError::Io`] | `MANIFEST_IO` |
//! | [`ManifestError::Invalid`] | `MANIFEST_INVALID` |
//! | [`ManifestError::DuplicatePort`] | `MANIFEST_DUPLICATE_PORT` |
//! | [`ManifestError::MultipleTriggers`] | `MANIFEST_MULTIPLE_TRIGGERS` |
//! | [`PipelineError::Io`] | `PIPELINE_IO` |
//! | [`PipelineError::Invalid`] | `PIPELINE_INVALID` |
//! | [`PipelineError::Cycle`] | `PIPELINE_CYCLE` |
//! | [`PipelineError::UnknownModule`] | `PIPELINE_UNKNOWN_MODULE` |
//! | [`PipelineError::UnknownOutput`] | `PIPELINE_UNKNOWN_OUTPUT` |
//! | [`PipelineError::UnknownInput`] | `PIPELINE_UNKNOWN_INPUT` |
//! | [`PipelineError::TypeIncompatible`] | `PIPELINE_TYPE_INCOMPATIBLE` |
//! | [`PipelineError::MissingTrigger`] | `PIPELINE_MISSING_TRIGGER` |
//!
//! All carry severity [`Severity::Config`] (exit code 3) and are not
//! recoverable by retry.

use cascade_types::{ErrorCode, ModuleName, Severity, SlotId, TypeExpr};
use std::path::PathBuf;
use thiserror::Error;

/// Error loading or validating a module manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("cannot read manifest {path}: {source}")]
    Io {
        /// Path of the manifest file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The manifest failed to parse or a field failed validation.
    #[error("invalid manifest {path}: {reason}")]
    Invalid {
        /// Path of the manifest file.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },

    /// An input or output name is declared twice.
    #[error("manifest '{module}' declares {kind} '{port}' more than once")]
    DuplicatePort {
        /// Module the manifest belongs to.
        module: ModuleName,
        /// `"input"` or `"output"`.
        kind: &'static str,
        /// The duplicated port name.
        port: String,
    },

    /// More than one input carries `trigger: true`.
    #[error("manifest '{module}' declares multiple trigger inputs")]
    MultipleTriggers {
        /// Module the manifest belongs to.
        module: ModuleName,
    },
}

impl ErrorCode for ManifestError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "MANIFEST_IO",
            Self::Invalid { .. } => "MANIFEST_INVALID",
            Self::DuplicatePort { .. } => "MANIFEST_DUPLICATE_PORT",
            Self::MultipleTriggers { .. } => "MANIFEST_MULTIPLE_TRIGGERS",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn severity(&self) -> Severity {
        Severity::Config
    }
}

/// Error loading or validating a pipeline document.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The pipeline file could not be read.
    #[error("cannot read pipeline {path}: {source}")]
    Io {
        /// Path of the pipeline file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The pipeline failed to parse or a structural rule was broken.
    #[error("invalid pipeline: {reason}")]
    Invalid {
        /// What was wrong.
        reason: String,
    },

    /// The slot graph contains a cycle.
    #[error("pipeline contains a dependency cycle through slots: {}", join_slots(.nodes))]
    Cycle {
        /// Slots participating in the cyclic residue, sorted.
        nodes: Vec<SlotId>,
    },

    /// A slot names a module no manifest was discovered for.
    #[error("slot '{slot}' references unknown module '{module}'")]
    UnknownModule {
        /// The referencing slot.
        slot: SlotId,
        /// The unresolved module name.
        module: ModuleName,
    },

    /// An input binding targets an output the producing manifest does
    /// not declare.
    #[error("slot '{slot}' input '{input}' is wired to '{producer}.{output}', but '{producer}' declares no output '{output}'")]
    UnknownOutput {
        /// The consuming slot.
        slot: SlotId,
        /// The local input name.
        input: String,
        /// The producing slot.
        producer: SlotId,
        /// The missing output name.
        output: String,
    },

    /// An input binding names an input the consuming manifest does not
    /// declare.
    #[error("slot '{slot}' wires input '{input}' which its manifest does not declare")]
    UnknownInput {
        /// The consuming slot.
        slot: SlotId,
        /// The undeclared input name.
        input: String,
    },

    /// The producer's declared output type cannot be translated into
    /// the consumer's declared input type.
    #[error("slot '{slot}' input '{input}': no coercion from '{src}' to '{dst}'")]
    TypeIncompatible {
        /// The consuming slot.
        slot: SlotId,
        /// The local input name.
        input: String,
        /// Producer's declared output type.
        src: TypeExpr,
        /// Consumer's declared input type.
        dst: TypeExpr,
    },

    /// A slot runs `on_trigger` but its manifest declares no trigger
    /// input.
    #[error("slot '{slot}' runs on_trigger but module '{module}' declares no trigger input")]
    MissingTrigger {
        /// The slot in question.
        slot: SlotId,
        /// Its module.
        module: ModuleName,
    },
}

fn join_slots(nodes: &[SlotId]) -> String {
    nodes
        .iter()
        .map(SlotId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ErrorCode for PipelineError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "PIPELINE_IO",
            Self::Invalid { .. } => "PIPELINE_INVALID",
            Self::Cycle { .. } => "PIPELINE_CYCLE",
            Self::UnknownModule { .. } => "PIPELINE_UNKNOWN_MODULE",
            Self::UnknownOutput { .. } => "PIPELINE_UNKNOWN_OUTPUT",
            Self::UnknownInput { .. } => "PIPELINE_UNKNOWN_INPUT",
            Self::TypeIncompatible { .. } => "PIPELINE_TYPE_INCOMPATIBLE",
            Self::MissingTrigger { .. } => "PIPELINE_MISSING_TRIGGER",
        }
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn severity(&self) -> Severity {
        Severity::Config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_types::assert_error_codes;

    fn slot(s: &str) -> SlotId {
        s.parse().unwrap()
    }

    fn module(s: &str) -> ModuleName {
        s.parse().unwrap()
    }

    #[test]
    fn manifest_error_codes() {
        assert_error_codes(
            &[
                ManifestError::Io {
                    path: "x".into(),
                    source: std::io::Error::other("x"),
                },
                ManifestError::Invalid {
                    path: "x".into(),
                    reason: "x".into(),
                },
                ManifestError::DuplicatePort {
                    module: module("m"),
                    kind: "input",
                    port: "p".into(),
                },
                ManifestError::MultipleTriggers { module: module("m") },
            ],
            "MANIFEST_",
        );
    }

    #[test]
    fn pipeline_error_codes() {
        assert_error_codes(
            &[
                PipelineError::Invalid { reason: "x".into() },
                PipelineError::Cycle {
                    nodes: vec![slot("a"), slot("b")],
                },
                PipelineError::UnknownModule {
                    slot: slot("a"),
                    module: module("m"),
                },
                PipelineError::UnknownOutput {
                    slot: slot("a"),
                    input: "i".into(),
                    producer: slot("b"),
                    output: "o".into(),
                },
                PipelineError::UnknownInput {
                    slot: slot("a"),
                    input: "i".into(),
                },
                PipelineError::TypeIncompatible {
                    slot: slot("a"),
                    input: "i".into(),
                    src: TypeExpr::Str,
                    dst: TypeExpr::Int,
                },
                PipelineError::MissingTrigger {
                    slot: slot("a"),
                    module: module("m"),
                },
            ],
            "PIPELINE_",
        );
    }

    #[test]
    fn all_config_severity() {
        let err = PipelineError::Cycle {
            nodes: vec![slot("a")],
        };
        assert_eq!(err.severity(), Severity::Config);
        assert_eq!(err.severity().exit_code(), 3);
        assert!(err.to_string().contains("a"));
    }

    #[test]
    fn cycle_lists_offenders() {
        let err = PipelineError::Cycle {
            nodes: vec![slot("a"), slot("b")],
        };
        assert_eq!(err.to_string(), "pipeline contains a dependency cycle through slots: a, b");
    }
}
