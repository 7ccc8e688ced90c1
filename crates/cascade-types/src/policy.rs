//! Shared scheduling and failure-handling policies.
//!
//! These enums appear in pipeline documents, drive the bus's mailbox
//! behaviour, and select the module host's scheduling loop, so they
//! live here at the bottom of the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduling discipline of a pipeline slot.
///
/// | Mode | `iterate()` runs |
/// |------|------------------|
/// | `Once` | exactly once when the slot reaches Running |
/// | `Loop` | repeatedly, with a cycle delay between completions |
/// | `Reactive` | once per received envelope (pending envelopes coalesce) |
/// | `OnTrigger` | when a sentinel arrives on the declared trigger input |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Run once, then remain available as a publisher.
    #[default]
    Once,
    /// Run repeatedly with a cycle delay.
    Loop,
    /// Run in response to incoming envelopes.
    Reactive,
    /// Run only when the trigger input fires.
    OnTrigger,
}

impl RunMode {
    /// Returns `true` for modes that reach a terminal state on their
    /// own (everything except `Loop`), which feeds the engine's
    /// quiescence detection.
    #[must_use]
    pub fn is_finite(self) -> bool {
        !matches!(self, RunMode::Loop)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunMode::Once => "once",
            RunMode::Loop => "loop",
            RunMode::Reactive => "reactive",
            RunMode::OnTrigger => "on_trigger",
        };
        f.write_str(s)
    }
}

/// What the engine does when a module hook faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Signal engine-wide shutdown.
    #[default]
    Halt,
    /// Keep iterating; count the error.
    Continue,
    /// Terminate the faulting slot, leave the rest running.
    Isolate,
    /// Log and continue silently.
    LogOnly,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorPolicy::Halt => "halt",
            ErrorPolicy::Continue => "continue",
            ErrorPolicy::Isolate => "isolate",
            ErrorPolicy::LogOnly => "log_only",
        };
        f.write_str(s)
    }
}

/// What a full mailbox does with the next envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Suspend the publisher until space frees.
    #[default]
    Block,
    /// Evict the oldest queued envelope, then enqueue.
    DropOldest,
    /// Drop the incoming envelope.
    DropNew,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverflowPolicy::Block => "block",
            OverflowPolicy::DropOldest => "drop_oldest",
            OverflowPolicy::DropNew => "drop_new",
        };
        f.write_str(s)
    }
}
