//! The module engine.
//!
//! Composition root for a run:
//!
//! 1. Discover modules via the registry across configured roots.
//! 2. Load and validate the pipeline against discovered manifests.
//! 3. Verify each referenced module; consult the admission policy;
//!    excluded slots and their downstream consumers are removed
//!    transitively.
//! 4. Topologically sort the surviving slots into layers.
//! 5. Wire: register outputs and subscriptions on the bus.
//! 6. Construct each module and run `initialise` in topological order.
//! 7. Start one host task per slot.
//! 8. Monitor until a terminal condition, then run the shutdown
//!    coordinator: reverse topological order, bounded grace period,
//!    force-cancel stragglers.

use crate::host::{HostEvent, ModuleHost};
use crate::{
    Capabilities, EngineError, FactoryRegistry, FaultPhase, ModuleRegistry, RuntimeConfig,
    ShutdownHandle, SlotState, StateTable, WorkerPool,
};
use cascade_bus::{MailboxConfig, MessageBus, MetricsSnapshot, PublisherHandle};
use cascade_manifest::{load_pipeline, topo_layers, Pipeline};
use cascade_security::{AdmissionPolicy, TrustedSigners};
use cascade_types::{ErrorCode, ErrorPolicy, QualifiedTopic, RunMode, Severity, SlotId};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn};

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The pipeline that ran.
    pub pipeline: String,
    /// Worst severity encountered; drives the process exit code.
    pub severity: Severity,
    /// Slots excluded by the admission policy, including transitive
    /// downstream exclusions.
    pub excluded: Vec<SlotId>,
    /// Module faults observed.
    pub faults: u64,
    /// Slots force-cancelled after exceeding the grace period.
    pub shutdown_timeouts: Vec<SlotId>,
    /// Bus delivery counters.
    pub metrics: MetricsSnapshot,
}

/// The top-level orchestrator.
pub struct Engine {
    config: RuntimeConfig,
    factories: FactoryRegistry,
    admission: AdmissionPolicy,
    shutdown: ShutdownHandle,
}

impl Engine {
    /// Creates an engine.
    #[must_use]
    pub fn new(
        config: RuntimeConfig,
        factories: FactoryRegistry,
        admission: AdmissionPolicy,
    ) -> Self {
        Self {
            config,
            factories,
            admission,
            shutdown: ShutdownHandle::new(),
        }
    }

    /// Returns the handle external triggers (Ctrl-C, tests) use to
    /// stop the run.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Loads and runs the named pipeline.
    ///
    /// `overrides` are `--set` style slot-config overrides applied
    /// before `initialise`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] on configuration-time failures; runtime
    /// module faults are resolved through the error policy and show up
    /// in the report instead.
    pub async fn run(
        &self,
        pipeline_name: &str,
        overrides: &[(SlotId, String, serde_json::Value)],
    ) -> Result<RunReport, EngineError> {
        let signers = TrustedSigners::load(&self.config.trusted_signers_path)?;
        let registry = ModuleRegistry::discover(&self.config.module_roots, &signers)?;

        let path = self.resolve_pipeline_path(pipeline_name)?;
        let mut pipeline = load_pipeline(&path, &registry)?;
        apply_overrides(&mut pipeline, overrides)?;

        self.run_pipeline(pipeline, &registry).await
    }

    /// Resolves a pipeline name to a document path: a path that exists
    /// is used as given, otherwise `<pipeline_dir>/<name>[.yaml]`.
    fn resolve_pipeline_path(&self, name: &str) -> Result<PathBuf, EngineError> {
        let direct = PathBuf::from(name);
        if direct.is_file() {
            return Ok(direct);
        }

        let file = if name.ends_with(".yaml") || name.ends_with(".yml") {
            name.to_string()
        } else {
            format!("{name}.yaml")
        };
        let path = self.config.pipeline_dir.join(file);
        if path.is_file() {
            Ok(path)
        } else {
            Err(EngineError::PipelineNotFound {
                name: name.to_string(),
                path,
            })
        }
    }

    /// Runs an already loaded and validated pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when validation fails, every slot is
    /// excluded, a module has no factory, or an `initialise` fault
    /// occurs under the `halt` policy.
    pub async fn run_pipeline(
        &self,
        pipeline: Pipeline,
        registry: &ModuleRegistry,
    ) -> Result<RunReport, EngineError> {
        cascade_manifest::validate_pipeline(&pipeline, registry)?;
        info!(pipeline = %pipeline.name, slots = pipeline.modules.len(), "Starting pipeline");

        let states = Arc::new(StateTable::new());
        for slot in &pipeline.modules {
            states.set_state(&slot.id, SlotState::Discovered);
            states.set_state(&slot.id, SlotState::Verified);
        }

        // Admission, with transitive downstream exclusion.
        let excluded = self.admit_slots(&pipeline, registry)?;
        let mut severity = if excluded.is_empty() {
            Severity::None
        } else {
            Severity::Security
        };

        let surviving = Pipeline {
            name: pipeline.name.clone(),
            execution: pipeline.execution.clone(),
            modules: pipeline
                .modules
                .iter()
                .filter(|s| !excluded.contains(&s.id))
                .cloned()
                .collect(),
        };
        if surviving.modules.is_empty() {
            if pipeline.modules.is_empty() {
                return Ok(RunReport {
                    pipeline: pipeline.name,
                    severity: Severity::None,
                    excluded: Vec::new(),
                    faults: 0,
                    shutdown_timeouts: Vec::new(),
                    metrics: MetricsSnapshot::default(),
                });
            }
            return Err(EngineError::NoSlotsRemain);
        }

        let layers = topo_layers(&surviving)?;

        // Every surviving slot needs a constructor before anything is
        // wired or initialised.
        for slot in &surviving.modules {
            if !self.factories.contains(&slot.name) {
                return Err(EngineError::NoFactory {
                    slot: slot.id.clone(),
                    module: slot.name.clone(),
                });
            }
        }

        // Wire the bus.
        let mut bus = MessageBus::with_cache_size(self.config.translation_cache_size);
        let mut activities: HashMap<SlotId, Arc<Notify>> = HashMap::new();
        let mut mailboxes: HashMap<SlotId, Vec<(String, cascade_bus::Mailbox)>> = HashMap::new();

        for slot in &surviving.modules {
            let record = registry
                .resolve(&slot.name)
                .ok_or_else(|| unknown_module(slot))?;
            for output in &record.manifest.outputs {
                bus.register_output(
                    QualifiedTopic::new(slot.id.clone(), &output.name),
                    output.ty.clone(),
                )?;
            }
            activities
                .entry(slot.id.clone())
                .or_insert_with(|| Arc::new(Notify::new()));
        }

        for slot in &surviving.modules {
            let manifest = registry
                .resolve(&slot.name)
                .map(|r| &r.manifest)
                .ok_or_else(|| unknown_module(slot))?;
            let activity = Arc::clone(&activities[&slot.id]);
            let slot_mailboxes = mailboxes.entry(slot.id.clone()).or_default();

            for (input_name, wired) in &slot.input {
                let expected = manifest
                    .input(input_name)
                    .map(|p| p.ty.clone())
                    .unwrap_or(cascade_types::TypeExpr::Any);
                let mailbox = bus.subscribe(
                    slot.id.clone(),
                    input_name.clone(),
                    wired,
                    expected,
                    slot.run_mode,
                    MailboxConfig {
                        capacity: slot.mailbox.capacity,
                        policy: slot.mailbox.overflow,
                    },
                    Arc::clone(&activity),
                )?;
                slot_mailboxes.push((input_name.clone(), mailbox));
            }
        }

        let bus = Arc::new(bus);
        let workers = WorkerPool::new(surviving.execution.max_threads);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<HostEvent>();

        // Construct and initialise in topological order.
        let mut modules: HashMap<SlotId, Box<dyn crate::Module>> = HashMap::new();
        let mut capabilities: HashMap<SlotId, Capabilities> = HashMap::new();
        let mut failed_init: BTreeSet<SlotId> = BTreeSet::new();
        let mut faults: u64 = 0;

        for layer in &layers {
            for slot_id in layer {
                let Some(slot) = surviving.slot(slot_id) else {
                    continue;
                };
                let record = registry
                    .resolve(&slot.name)
                    .ok_or_else(|| unknown_module(slot))?;
                let mut module = self.factories.construct(&record.manifest).ok_or_else(|| {
                    EngineError::NoFactory {
                        slot: slot_id.clone(),
                        module: slot.name.clone(),
                    }
                })?;
                states.set_state(slot_id, SlotState::Constructed);

                let caps = Capabilities::new(
                    PublisherHandle::new(Arc::clone(&bus), slot_id.clone()),
                    workers.clone(),
                    info_span!("module", slot = %slot_id),
                );

                match module.initialise(&slot.config, &caps).await {
                    Ok(()) => {
                        states.set_state(slot_id, SlotState::Initialised);
                        debug!(slot = %slot_id, "Initialised");
                        modules.insert(slot_id.clone(), module);
                        capabilities.insert(slot_id.clone(), caps);
                    }
                    Err(e) => {
                        faults += 1;
                        warn!(slot = %slot_id, error = %e, "Initialise failed");
                        if surviving.execution.error_policy == ErrorPolicy::Halt {
                            return Err(EngineError::ModuleFault {
                                slot: slot_id.clone(),
                                phase: FaultPhase::Initialise,
                                message: e.to_string(),
                            });
                        }
                        if surviving.execution.error_policy != ErrorPolicy::LogOnly {
                            severity = severity.worst(Severity::Pipeline);
                        }
                        states.set_state(slot_id, SlotState::Terminated);
                        bus.close_subscriber(slot_id);
                        failed_init.insert(slot_id.clone());
                    }
                }
            }
        }

        // Start hosts. Every dependency is at least Initialised by
        // construction order; the gate below makes the contract
        // explicit.
        let mut hosts: Vec<(SlotId, watch::Sender<bool>, JoinHandle<()>)> = Vec::new();
        for layer in &layers {
            for slot_id in layer {
                let Some(module) = modules.remove(slot_id) else {
                    continue;
                };
                let Some(slot) = surviving.slot(slot_id) else {
                    continue;
                };
                let deps: Vec<SlotId> = slot.effective_deps().into_iter().cloned().collect();
                debug_assert!(
                    states.all_at_least(deps.iter(), SlotState::Initialised)
                        || deps.iter().any(|d| failed_init.contains(d)),
                    "upstream slots must be initialised before start"
                );

                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                let Some(caps) = capabilities.remove(slot_id) else {
                    continue;
                };
                let trigger_input = registry
                    .resolve(&slot.name)
                    .and_then(|r| r.manifest.trigger_input())
                    .map(|p| p.name.clone());

                let host = ModuleHost {
                    slot: slot_id.clone(),
                    run_mode: slot.run_mode,
                    module,
                    caps,
                    bus: Arc::clone(&bus),
                    inputs: mailboxes.remove(slot_id).unwrap_or_default(),
                    trigger_input,
                    activity: Arc::clone(&activities[slot_id]),
                    cycle_delay: slot
                        .cycle_delay
                        .unwrap_or(surviving.execution.cycle_delay),
                    error_policy: surviving.execution.error_policy,
                    retries: surviving.execution.retries,
                    states: Arc::clone(&states),
                    events: events_tx.clone(),
                    shutdown: shutdown_rx,
                    consecutive_faults: 0,
                };
                hosts.push((slot_id.clone(), shutdown_tx, host.spawn()));
            }
        }
        drop(events_tx);

        // Monitor until a terminal condition.
        let non_loop: Vec<SlotId> = surviving
            .modules
            .iter()
            .filter(|s| s.run_mode != RunMode::Loop && !failed_init.contains(&s.id))
            .map(|s| s.id.clone())
            .collect();
        let mut completed: BTreeSet<SlotId> = failed_init.clone();
        let mut shutdown_timeouts = Vec::new();

        if !hosts.is_empty() {
            let quiescent = |completed: &BTreeSet<SlotId>| {
                !non_loop.is_empty()
                    && non_loop.iter().all(|s| completed.contains(s))
                    && bus.all_mailboxes_empty()
                    && states.none_busy()
            };

            let mut poll = tokio::time::interval(Duration::from_millis(25));
            poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tokio::pin! {
                let timeout = async {
                    match surviving.execution.timeout {
                        Some(d) => tokio::time::sleep(d).await,
                        None => std::future::pending::<()>().await,
                    }
                };
            }

            loop {
                tokio::select! {
                    event = events_rx.recv() => match event {
                        Some(HostEvent::Completed { slot }) => {
                            debug!(%slot, "Slot completed");
                            completed.insert(slot);
                            if quiescent(&completed) {
                                info!("Pipeline quiescent, shutting down");
                                break;
                            }
                        }
                        Some(HostEvent::Terminated { slot }) => {
                            completed.insert(slot);
                            if quiescent(&completed) {
                                break;
                            }
                        }
                        Some(HostEvent::Fault { slot, phase }) => {
                            faults += 1;
                            debug!(%slot, %phase, "Fault reported");
                            if surviving.execution.error_policy != ErrorPolicy::LogOnly {
                                severity = severity.worst(Severity::Pipeline);
                            }
                        }
                        Some(HostEvent::HaltRequested { slot }) => {
                            warn!(%slot, "Halting run after fault");
                            severity = severity.worst(Severity::Pipeline);
                            break;
                        }
                        None => break,
                    },
                    _ = poll.tick() => {
                        if quiescent(&completed) {
                            info!("Pipeline quiescent, shutting down");
                            break;
                        }
                    }
                    () = &mut timeout => {
                        warn!(pipeline = %surviving.name, "Pipeline timeout reached");
                        break;
                    }
                    () = self.shutdown.triggered() => {
                        info!("Shutdown requested");
                        break;
                    }
                }
            }

            // Shutdown coordinator: reverse topological order, bounded
            // grace, force-cancel stragglers.
            let grace = surviving.execution.grace_period;
            let mut by_slot: HashMap<SlotId, (watch::Sender<bool>, JoinHandle<()>)> = hosts
                .into_iter()
                .map(|(slot, tx, handle)| (slot, (tx, handle)))
                .collect();

            for layer in layers.iter().rev() {
                for slot_id in layer.iter().rev() {
                    let Some((shutdown_tx, mut handle)) = by_slot.remove(slot_id) else {
                        continue;
                    };
                    bus.close_subscriber(slot_id);
                    let _ = shutdown_tx.send(true);

                    match tokio::time::timeout(grace, &mut handle).await {
                        Ok(_) => debug!(slot = %slot_id, "Host terminated"),
                        Err(_) => {
                            let straggler = EngineError::ShutdownTimeout {
                                slot: slot_id.clone(),
                            };
                            warn!(code = straggler.code(), "{straggler}");
                            handle.abort();
                            severity = severity.worst(Severity::Pipeline);
                            shutdown_timeouts.push(slot_id.clone());
                            states.set_state(slot_id, SlotState::Terminated);
                        }
                    }
                }
            }
        }

        let report = RunReport {
            pipeline: surviving.name,
            severity,
            excluded: excluded.into_iter().collect(),
            faults,
            shutdown_timeouts,
            metrics: bus.metrics(),
        };
        info!(
            pipeline = %report.pipeline,
            severity = ?report.severity,
            faults = report.faults,
            "Run finished"
        );
        Ok(report)
    }

    /// Evaluates admission for every slot and computes the transitive
    /// closure of exclusions.
    fn admit_slots(
        &self,
        pipeline: &Pipeline,
        registry: &ModuleRegistry,
    ) -> Result<BTreeSet<SlotId>, EngineError> {
        let mut excluded: BTreeSet<SlotId> = BTreeSet::new();

        for slot in &pipeline.modules {
            let record = registry
                .resolve(&slot.name)
                .ok_or_else(|| unknown_module(slot))?;
            let decision = self.admission.decide(&slot.name, &record.verdict);
            if !decision.is_admitted() {
                let rejection = EngineError::SecurityRejected {
                    slot: slot.id.clone(),
                    module: slot.name.clone(),
                    verdict: record.verdict.label().to_string(),
                };
                warn!(code = rejection.code(), "{rejection}");
                excluded.insert(slot.id.clone());
            }
        }

        // Downstream consumers of excluded producers cannot run.
        loop {
            let mut grew = false;
            for slot in &pipeline.modules {
                if excluded.contains(&slot.id) {
                    continue;
                }
                if slot.effective_deps().iter().any(|d| excluded.contains(*d)) {
                    warn!(slot = %slot.id, "Excluded transitively: upstream slot excluded");
                    excluded.insert(slot.id.clone());
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        Ok(excluded)
    }
}

/// A slot whose module vanished between validation and use.
fn unknown_module(slot: &cascade_manifest::SlotSpec) -> EngineError {
    EngineError::Pipeline(cascade_manifest::PipelineError::UnknownModule {
        slot: slot.id.clone(),
        module: slot.name.clone(),
    })
}

/// Applies `--set <slot>.<key>=<value>` overrides onto slot configs.
fn apply_overrides(
    pipeline: &mut Pipeline,
    overrides: &[(SlotId, String, serde_json::Value)],
) -> Result<(), EngineError> {
    for (slot_id, key, value) in overrides {
        let slot = pipeline
            .modules
            .iter_mut()
            .find(|s| s.id == *slot_id)
            .ok_or_else(|| {
                EngineError::Pipeline(cascade_manifest::PipelineError::Invalid {
                    reason: format!("--set references unknown slot '{slot_id}'"),
                })
            })?;
        slot.config.insert(key.clone(), value.clone());
    }
    Ok(())
}
