//! Manifest and pipeline document handling for cascade.
//!
//! This crate turns the two user-authored YAML documents into
//! validated in-memory models:
//!
//! - **Module manifest** (`module.yaml`): what one module is called,
//!   what it needs, and the typed inputs/outputs it declares.
//! - **Pipeline document**: which modules run, how their slots wire
//!   together, and the execution options of the run.
//!
//! Loading is two-phase. Syntactic validation happens during
//! deserialisation (identifiers and type expressions are validated by
//! their serde impls); semantic validation runs afterwards against a
//! [`ManifestLookup`]: every slot name resolves, every dependency
//! exists, every input binding targets a declared output of a
//! compatible type, and the slot graph is acyclic.

mod error;
mod loader;
mod manifest;
mod pipeline;
mod validate;

pub use error::{ManifestError, PipelineError};
pub use loader::{load_manifest, load_pipeline, validate_pipeline, ManifestLookup};
pub use manifest::{ModuleManifest, PortDef, Requirement, RuntimeSpec};
pub use pipeline::{parse_duration, ExecutionOptions, MailboxSpec, Pipeline, SlotSpec};
pub use validate::topo_layers;
