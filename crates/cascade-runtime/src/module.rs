//! The module contract.
//!
//! Modules are the pluggable units a pipeline composes. Each one
//! implements [`Module`] and is driven by its host through four hooks:
//!
//! | Hook | When | Blocking? |
//! |------|------|-----------|
//! | `initialise` | once, before any delivery | may await |
//! | `on_input` | per delivered envelope | must not block |
//! | `iterate` | per run-mode schedule | may await |
//! | `teardown` | during shutdown | may await |
//!
//! `on_input` is called from the host's dispatch loop and typically
//! just stores the payload into module state; the host serialises it
//! against `iterate`, so a module observes one or the other at a time,
//! never both.
//!
//! Since dynamic code loading is out of scope, modules are constructed
//! through a [`FactoryRegistry`] keyed by manifest name: the embedding
//! application (or a test) registers one constructor per module it
//! ships.
//!
//! # Example
//!
//! ```
//! use cascade_runtime::{Capabilities, IterationOutcome, Module, ModuleError};
//! use cascade_bus::Envelope;
//! use cascade_types::Value;
//! use async_trait::async_trait;
//!
//! struct Doubler {
//!     pending: Vec<i64>,
//! }
//!
//! #[async_trait]
//! impl Module for Doubler {
//!     fn on_input(&mut self, envelope: &Envelope) -> Result<(), ModuleError> {
//!         if let Value::Int(n) = envelope.payload() {
//!             self.pending.push(*n);
//!         }
//!         Ok(())
//!     }
//!
//!     async fn iterate(&mut self, caps: &Capabilities) -> Result<IterationOutcome, ModuleError> {
//!         for n in self.pending.drain(..) {
//!             caps.publisher()
//!                 .publish("doubled", Value::Int(n * 2))
//!                 .await
//!                 .map_err(|e| ModuleError::ExecutionFailed(e.to_string()))?;
//!         }
//!         Ok(IterationOutcome::Continue)
//!     }
//! }
//! ```

use crate::WorkerPool;
use async_trait::async_trait;
use cascade_bus::{Envelope, PublisherHandle};
use cascade_manifest::ModuleManifest;
use cascade_types::{ErrorCode, ModuleName, Severity, SlotId};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Opaque configuration passed to `initialise`: the slot's `config`
/// override map from the pipeline document.
pub type ModuleConfigMap = HashMap<String, serde_json::Value>;

/// Error raised from a module hook.
///
/// The host catches these, logs them with the offending envelope
/// metadata, and resolves them through the pipeline's error policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    /// Initialisation failed; the slot will not run.
    #[error("initialisation failed: {0}")]
    InitFailed(String),

    /// An operation failed during execution.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// A delivered payload did not have the expected shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl ErrorCode for ModuleError {
    fn code(&self) -> &'static str {
        match self {
            Self::InitFailed(_) => "MODULE_INIT_FAILED",
            Self::ExecutionFailed(_) => "MODULE_EXECUTION_FAILED",
            Self::InvalidPayload(_) => "MODULE_INVALID_PAYLOAD",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::ExecutionFailed(_))
    }

    fn severity(&self) -> Severity {
        Severity::Pipeline
    }
}

/// What `iterate` wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Keep scheduling per the slot's run mode.
    Continue,
    /// The module is finished; the slot transitions to a terminal
    /// state (it remains available as a publisher).
    Done,
}

/// Capabilities handed to a module at `initialise`: its bus handle,
/// tracing span, and the shared worker pool.
#[derive(Clone)]
pub struct Capabilities {
    publisher: PublisherHandle,
    workers: WorkerPool,
    span: tracing::Span,
}

impl Capabilities {
    /// Bundles the capabilities for one slot.
    #[must_use]
    pub fn new(publisher: PublisherHandle, workers: WorkerPool, span: tracing::Span) -> Self {
        Self {
            publisher,
            workers,
            span,
        }
    }

    /// The slot-scoped publishing handle.
    #[must_use]
    pub fn publisher(&self) -> &PublisherHandle {
        &self.publisher
    }

    /// The shared worker pool for blocking work.
    #[must_use]
    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// The slot's tracing span; module log lines inside it carry the
    /// slot id.
    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// The slot this module runs as.
    #[must_use]
    pub fn slot(&self) -> &SlotId {
        self.publisher.slot()
    }
}

/// The module lifecycle contract.
#[async_trait]
pub trait Module: Send {
    /// Called once before any delivery or iteration.
    ///
    /// # Errors
    ///
    /// Returning an error keeps the slot from running; resolution
    /// follows the pipeline's error policy.
    async fn initialise(
        &mut self,
        _config: &ModuleConfigMap,
        _caps: &Capabilities,
    ) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called for each envelope delivered to one of the slot's
    /// inputs. Must not block; store the payload and return.
    ///
    /// # Errors
    ///
    /// Errors are caught by the host and resolved per error policy.
    fn on_input(&mut self, _envelope: &Envelope) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Called according to the slot's run mode.
    ///
    /// # Errors
    ///
    /// Errors are caught by the host and resolved per error policy.
    async fn iterate(&mut self, caps: &Capabilities) -> Result<IterationOutcome, ModuleError>;

    /// Called during shutdown, after the slot's mailboxes have been
    /// closed.
    ///
    /// # Errors
    ///
    /// Errors are logged; shutdown proceeds regardless.
    async fn teardown(&mut self) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Constructor for one module kind.
pub type ModuleFactory = Arc<dyn Fn(&ModuleManifest) -> Box<dyn Module> + Send + Sync>;

/// Registry of module constructors, keyed by manifest name.
#[derive(Default, Clone)]
pub struct FactoryRegistry {
    factories: HashMap<ModuleName, ModuleFactory>,
}

impl FactoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a constructor for `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: ModuleName, factory: F)
    where
        F: Fn(&ModuleManifest) -> Box<dyn Module> + Send + Sync + 'static,
    {
        self.factories.insert(name, Arc::new(factory));
    }

    /// Constructs a module instance for `manifest`, if a factory is
    /// registered.
    #[must_use]
    pub fn construct(&self, manifest: &ModuleManifest) -> Option<Box<dyn Module>> {
        self.factories.get(&manifest.name).map(|f| f(manifest))
    }

    /// Returns `true` when a factory exists for `name`.
    #[must_use]
    pub fn contains(&self, name: &ModuleName) -> bool {
        self.factories.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_types::assert_error_codes;

    struct Noop;

    #[async_trait]
    impl Module for Noop {
        async fn iterate(&mut self, _caps: &Capabilities) -> Result<IterationOutcome, ModuleError> {
            Ok(IterationOutcome::Done)
        }
    }

    fn manifest(name: &str) -> ModuleManifest {
        serde_yaml::from_str(&format!(
            "name: {name}\nversion: 0.1.0\nruntime: {{main: src/main}}\n"
        ))
        .unwrap()
    }

    #[test]
    fn factory_registry_constructs_by_name() {
        let mut registry = FactoryRegistry::new();
        registry.register("noop".parse().unwrap(), |_m| Box::new(Noop));

        assert!(registry.contains(&"noop".parse().unwrap()));
        assert!(registry.construct(&manifest("noop")).is_some());
        assert!(registry.construct(&manifest("other")).is_none());
    }

    #[test]
    fn module_error_codes() {
        assert_error_codes(
            &[
                ModuleError::InitFailed("x".into()),
                ModuleError::ExecutionFailed("x".into()),
                ModuleError::InvalidPayload("x".into()),
            ],
            "MODULE_",
        );
        assert!(ModuleError::ExecutionFailed("x".into()).is_recoverable());
        assert!(!ModuleError::InvalidPayload("x".into()).is_recoverable());
    }
}
