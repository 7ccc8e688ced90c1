//! Per-slot host task.
//!
//! Each surviving slot runs as one task that owns the module instance
//! and all of its input mailboxes. The task alternates between waiting
//! on its trigger (mailbox activity, a cycle timer, or a once-latch)
//! and calling into the module, which serialises `on_input` against
//! `iterate` by construction.
//!
//! # Run-mode loops
//!
//! | Mode | Loop shape |
//! |------|-----------|
//! | `once` | iterate once, then drain inputs until shutdown |
//! | `loop` | drain inputs, iterate, sleep the cycle delay |
//! | `reactive` | wait for input, drain the whole backlog, iterate once |
//! | `on_trigger` | as reactive, but iterate only when the trigger input fired |
//!
//! # Error boundary
//!
//! A fault from any hook is caught, logged with the offending envelope
//! metadata, reported to the engine, and resolved per the pipeline's
//! error policy. Consecutive `iterate` faults up to the configured
//! retry count are retried before the policy applies.

use crate::{Capabilities, FaultPhase, IterationOutcome, Module, ModuleError};
use crate::{SlotState, StateTable};
use cascade_bus::{Envelope, Mailbox, MessageBus};
use cascade_types::{ErrorPolicy, RunMode, SlotId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, Instrument};

/// Events a host reports to the engine's monitor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// The module finished its work; the slot is terminal for
    /// quiescence purposes (it still drains inputs and can publish
    /// nothing further).
    Completed {
        /// The finished slot.
        slot: SlotId,
    },
    /// The host task finished teardown and is exiting.
    Terminated {
        /// The terminated slot.
        slot: SlotId,
    },
    /// A module hook faulted.
    Fault {
        /// The faulting slot.
        slot: SlotId,
        /// The hook that faulted.
        phase: FaultPhase,
    },
    /// A fault under the `halt` policy requests engine-wide shutdown.
    HaltRequested {
        /// The slot whose fault triggered the halt.
        slot: SlotId,
    },
}

/// Why the host's scheduling loop ended.
enum LoopExit {
    /// Shutdown was signalled (or all mailboxes closed).
    Shutdown,
    /// An `isolate`-policy fault terminated this slot only.
    Isolated,
    /// A `halt`-policy fault ended the loop; the engine was notified.
    Halted,
}

/// Resolution of one fault.
enum FaultAction {
    Retry,
    Continue,
    Isolate,
    Halt,
}

/// The per-slot execution task.
pub struct ModuleHost {
    pub(crate) slot: SlotId,
    pub(crate) run_mode: RunMode,
    pub(crate) module: Box<dyn Module>,
    pub(crate) caps: Capabilities,
    pub(crate) bus: Arc<MessageBus>,
    /// Input name and mailbox, in wiring order.
    pub(crate) inputs: Vec<(String, Mailbox)>,
    /// The trigger input name for `on_trigger` slots.
    pub(crate) trigger_input: Option<String>,
    /// Fires on any push into this slot's mailboxes.
    pub(crate) activity: Arc<Notify>,
    pub(crate) cycle_delay: Duration,
    pub(crate) error_policy: ErrorPolicy,
    pub(crate) retries: u32,
    pub(crate) states: Arc<StateTable>,
    pub(crate) events: mpsc::UnboundedSender<HostEvent>,
    pub(crate) shutdown: watch::Receiver<bool>,
    /// Consecutive fault counter feeding the retry budget.
    pub(crate) consecutive_faults: u32,
}

impl ModuleHost {
    /// Spawns the host onto the runtime.
    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        self.states.set_state(&self.slot, SlotState::Running);
        info!(slot = %self.slot, mode = %self.run_mode, "Host running");

        let exit = match self.run_mode {
            RunMode::Once => self.run_once().await,
            RunMode::Loop => self.run_cyclic().await,
            RunMode::Reactive => self.run_reactive().await,
            RunMode::OnTrigger => self.run_on_trigger().await,
        };

        self.states.set_state(&self.slot, SlotState::ShuttingDown);
        // Close our mailboxes first: nothing may be delivered once
        // teardown has begun.
        self.bus.close_subscriber(&self.slot);

        let span = self.caps.span().clone();
        if let Err(e) = self.module.teardown().instrument(span).await {
            self.report_fault(FaultPhase::Teardown, &e, None);
        }

        self.states.set_state(&self.slot, SlotState::Terminated);
        match exit {
            LoopExit::Shutdown => info!(slot = %self.slot, "Host stopped"),
            LoopExit::Isolated => info!(slot = %self.slot, "Host isolated after fault"),
            LoopExit::Halted => info!(slot = %self.slot, "Host stopped by halting fault"),
        }
        let _ = self.events.send(HostEvent::Terminated {
            slot: self.slot.clone(),
        });
    }

    /// `once`: one (retried) iteration, then input draining.
    async fn run_once(&mut self) -> LoopExit {
        match self.iterate_with_retries().await {
            Ok(_) => {}
            Err(exit) => return exit,
        }
        self.mark_completed();
        self.drain_until_shutdown().await
    }

    /// `loop`: iterate with a cycle delay between completions.
    async fn run_cyclic(&mut self) -> LoopExit {
        loop {
            if self.shutdown_requested() {
                return LoopExit::Shutdown;
            }
            if let Err(exit) = self.dispatch_backlog() {
                return exit;
            }
            match self.iterate_with_retries().await {
                Ok(IterationOutcome::Continue) => {}
                Ok(IterationOutcome::Done) => {
                    self.mark_completed();
                    return self.drain_until_shutdown().await;
                }
                Err(exit) => return exit,
            }

            tokio::select! {
                () = signalled(&mut self.shutdown) => return LoopExit::Shutdown,
                () = tokio::time::sleep(self.cycle_delay) => {}
            }
        }
    }

    /// `reactive`: one iteration per backlog of envelopes.
    async fn run_reactive(&mut self) -> LoopExit {
        loop {
            let received = tokio::select! {
                () = signalled(&mut self.shutdown) => return LoopExit::Shutdown,
                received = recv_any(&self.inputs, &self.activity) => received,
            };
            let Some((input_index, envelope)) = received else {
                return LoopExit::Shutdown;
            };

            // Coalesce everything pending into this iteration.
            if let Err(exit) = self.dispatch(input_index, &envelope) {
                return exit;
            }
            if let Err(exit) = self.dispatch_backlog() {
                return exit;
            }

            match self.iterate_with_retries().await {
                Ok(IterationOutcome::Continue) => {}
                Ok(IterationOutcome::Done) => {
                    self.mark_completed();
                    return self.drain_until_shutdown().await;
                }
                Err(exit) => return exit,
            }
        }
    }

    /// `on_trigger`: iterate only when the trigger input fired.
    async fn run_on_trigger(&mut self) -> LoopExit {
        loop {
            let received = tokio::select! {
                () = signalled(&mut self.shutdown) => return LoopExit::Shutdown,
                received = recv_any(&self.inputs, &self.activity) => received,
            };
            let Some((input_index, envelope)) = received else {
                return LoopExit::Shutdown;
            };

            let mut fired = self.is_trigger(input_index);
            if let Err(exit) = self.dispatch(input_index, &envelope) {
                return exit;
            }
            loop {
                let Some((index, envelope)) = try_recv_any(&self.inputs) else {
                    break;
                };
                fired |= self.is_trigger(index);
                if let Err(exit) = self.dispatch(index, &envelope) {
                    return exit;
                }
            }

            if !fired {
                continue;
            }
            match self.iterate_with_retries().await {
                Ok(IterationOutcome::Continue) => {}
                Ok(IterationOutcome::Done) => {
                    self.mark_completed();
                    return self.drain_until_shutdown().await;
                }
                Err(exit) => return exit,
            }
        }
    }

    fn is_trigger(&self, input_index: usize) -> bool {
        match (&self.trigger_input, self.inputs.get(input_index)) {
            (Some(trigger), Some((name, _))) => trigger == name,
            _ => false,
        }
    }

    /// Keeps delivering `on_input` after the module completed, so
    /// upstream publishers are not wedged behind a full mailbox.
    async fn drain_until_shutdown(&mut self) -> LoopExit {
        loop {
            if self.inputs.is_empty() {
                signalled(&mut self.shutdown).await;
                return LoopExit::Shutdown;
            }
            let received = tokio::select! {
                () = signalled(&mut self.shutdown) => return LoopExit::Shutdown,
                received = recv_any(&self.inputs, &self.activity) => received,
            };
            let Some((input_index, envelope)) = received else {
                return LoopExit::Shutdown;
            };
            if let Err(exit) = self.dispatch(input_index, &envelope) {
                return exit;
            }
        }
    }

    /// Dispatches every currently queued envelope.
    fn dispatch_backlog(&mut self) -> Result<(), LoopExit> {
        while let Some((index, envelope)) = try_recv_any(&self.inputs) {
            self.dispatch(index, &envelope)?;
        }
        Ok(())
    }

    /// Calls `on_input` under the module's span, resolving faults.
    fn dispatch(&mut self, _input_index: usize, envelope: &Envelope) -> Result<(), LoopExit> {
        let span = self.caps.span().clone();
        let result = span.in_scope(|| self.module.on_input(envelope));
        match result {
            Ok(()) => {
                self.reset_faults();
                Ok(())
            }
            Err(e) => match self.resolve_fault(FaultPhase::OnInput, &e, Some(envelope)) {
                FaultAction::Retry | FaultAction::Continue => Ok(()),
                FaultAction::Isolate => Err(LoopExit::Isolated),
                FaultAction::Halt => Err(LoopExit::Halted),
            },
        }
    }

    /// Runs `iterate`, retrying consecutive faults up to the retry
    /// budget before applying the error policy.
    async fn iterate_with_retries(&mut self) -> Result<IterationOutcome, LoopExit> {
        loop {
            if self.shutdown_requested() {
                return Err(LoopExit::Shutdown);
            }

            self.states.set_busy(&self.slot, true);
            let span = self.caps.span().clone();
            let result = self.module.iterate(&self.caps).instrument(span).await;
            self.states.set_busy(&self.slot, false);

            match result {
                Ok(outcome) => {
                    self.reset_faults();
                    return Ok(outcome);
                }
                Err(e) => match self.resolve_fault(FaultPhase::Iterate, &e, None) {
                    FaultAction::Retry => continue,
                    FaultAction::Continue => return Ok(IterationOutcome::Continue),
                    FaultAction::Isolate => return Err(LoopExit::Isolated),
                    FaultAction::Halt => return Err(LoopExit::Halted),
                },
            }
        }
    }

    fn mark_completed(&self) {
        let _ = self.events.send(HostEvent::Completed {
            slot: self.slot.clone(),
        });
    }

    fn shutdown_requested(&mut self) -> bool {
        *self.shutdown.borrow_and_update()
    }

    fn reset_faults(&mut self) {
        self.consecutive_faults = 0;
    }

    fn report_fault(&self, phase: FaultPhase, e: &ModuleError, envelope: Option<&Envelope>) {
        match envelope {
            Some(envelope) => error!(
                slot = %self.slot,
                %phase,
                topic = %envelope.topic(),
                source = %envelope.source_slot(),
                input = envelope.input_name().unwrap_or("-"),
                error = %e,
                "Module fault"
            ),
            None => error!(slot = %self.slot, %phase, error = %e, "Module fault"),
        }
        let _ = self.events.send(HostEvent::Fault {
            slot: self.slot.clone(),
            phase,
        });
    }

    fn resolve_fault(
        &mut self,
        phase: FaultPhase,
        e: &ModuleError,
        envelope: Option<&Envelope>,
    ) -> FaultAction {
        self.report_fault(phase, e, envelope);
        self.consecutive_faults += 1;
        if phase == FaultPhase::Iterate && self.consecutive_faults <= self.retries {
            return FaultAction::Retry;
        }

        match self.error_policy {
            ErrorPolicy::Halt => {
                let _ = self.events.send(HostEvent::HaltRequested {
                    slot: self.slot.clone(),
                });
                FaultAction::Halt
            }
            ErrorPolicy::Continue | ErrorPolicy::LogOnly => FaultAction::Continue,
            ErrorPolicy::Isolate => FaultAction::Isolate,
        }
    }
}

/// Completes when the shutdown flag turns true (or the sender is
/// gone).
async fn signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Receives the next envelope from any input, in input order within
/// one wake-up. Returns `None` once every mailbox is closed and
/// drained.
async fn recv_any(inputs: &[(String, Mailbox)], activity: &Notify) -> Option<(usize, Envelope)> {
    loop {
        let notified = activity.notified();

        let mut all_closed = !inputs.is_empty();
        for (index, (_, mailbox)) in inputs.iter().enumerate() {
            if let Some(envelope) = mailbox.try_recv() {
                return Some((index, envelope));
            }
            if !mailbox.is_closed() {
                all_closed = false;
            }
        }
        if all_closed {
            return None;
        }

        notified.await;
    }
}

/// Non-blocking receive across all inputs.
fn try_recv_any(inputs: &[(String, Mailbox)]) -> Option<(usize, Envelope)> {
    inputs
        .iter()
        .enumerate()
        .find_map(|(index, (_, mailbox))| mailbox.try_recv().map(|e| (index, e)))
}
