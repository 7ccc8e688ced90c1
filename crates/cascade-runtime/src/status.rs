//! Slot lifecycle state.
//!
//! ```text
//! Discovered → Verified → Constructed → Initialised → Running
//!                  │                                     │
//!                  └── (rejected: skips Running)         ▼
//!                                                  ShuttingDown → Terminated
//! ```
//!
//! The engine owns one [`StateTable`] per run; hosts update their own
//! slot's entry as they progress, and the quiescence monitor reads the
//! whole table.

use cascade_types::SlotId;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Lifecycle state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlotState {
    /// Manifest found on disk.
    Discovered,
    /// Verification verdict attached.
    Verified,
    /// Module instance constructed.
    Constructed,
    /// `initialise()` completed.
    Initialised,
    /// Host task running.
    Running,
    /// Teardown in progress.
    ShuttingDown,
    /// Final state; no hook runs after this.
    Terminated,
}

impl SlotState {
    /// Returns `true` for the final state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

/// Per-slot status: lifecycle state plus whether an iteration is in
/// flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotStatus {
    /// Lifecycle state.
    pub state: SlotState,
    /// `true` while `iterate()` is running.
    pub busy: bool,
}

/// Shared table of slot statuses.
#[derive(Debug, Default)]
pub struct StateTable {
    slots: Mutex<HashMap<SlotId, SlotStatus>>,
}

impl StateTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lifecycle state of a slot.
    pub fn set_state(&self, slot: &SlotId, state: SlotState) {
        let mut slots = self.slots.lock();
        let entry = slots.entry(slot.clone()).or_insert(SlotStatus {
            state,
            busy: false,
        });
        entry.state = state;
    }

    /// Marks whether a slot's iteration is in flight.
    pub fn set_busy(&self, slot: &SlotId, busy: bool) {
        let mut slots = self.slots.lock();
        if let Some(entry) = slots.get_mut(slot) {
            entry.busy = busy;
        }
    }

    /// Returns the status of a slot.
    #[must_use]
    pub fn get(&self, slot: &SlotId) -> Option<SlotStatus> {
        self.slots.lock().get(slot).copied()
    }

    /// Returns `true` when every listed slot has reached at least
    /// `state`.
    #[must_use]
    pub fn all_at_least<'a>(
        &self,
        slots: impl IntoIterator<Item = &'a SlotId>,
        state: SlotState,
    ) -> bool {
        let table = self.slots.lock();
        slots
            .into_iter()
            .all(|s| table.get(s).is_some_and(|status| status.state >= state))
    }

    /// Returns `true` when no slot has an iteration in flight.
    #[must_use]
    pub fn none_busy(&self) -> bool {
        self.slots.lock().values().all(|s| !s.busy)
    }

    /// Returns `true` when every listed slot is terminated.
    #[must_use]
    pub fn all_terminated<'a>(&self, slots: impl IntoIterator<Item = &'a SlotId>) -> bool {
        self.all_at_least(slots, SlotState::Terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(s: &str) -> SlotId {
        s.parse().unwrap()
    }

    #[test]
    fn state_ordering_follows_lifecycle() {
        assert!(SlotState::Discovered < SlotState::Verified);
        assert!(SlotState::Verified < SlotState::Constructed);
        assert!(SlotState::Constructed < SlotState::Initialised);
        assert!(SlotState::Initialised < SlotState::Running);
        assert!(SlotState::Running < SlotState::ShuttingDown);
        assert!(SlotState::ShuttingDown < SlotState::Terminated);
        assert!(SlotState::Terminated.is_terminal());
        assert!(!SlotState::Running.is_terminal());
    }

    #[test]
    fn table_tracks_states() {
        let table = StateTable::new();
        let a = slot("a");
        let b = slot("b");

        table.set_state(&a, SlotState::Initialised);
        table.set_state(&b, SlotState::Constructed);

        assert!(table.all_at_least([&a], SlotState::Initialised));
        assert!(!table.all_at_least([&a, &b], SlotState::Initialised));

        table.set_state(&b, SlotState::Initialised);
        assert!(table.all_at_least([&a, &b], SlotState::Initialised));
    }

    #[test]
    fn unknown_slot_fails_threshold() {
        let table = StateTable::new();
        assert!(!table.all_at_least([&slot("ghost")], SlotState::Discovered));
    }

    #[test]
    fn busy_tracking() {
        let table = StateTable::new();
        let a = slot("a");
        table.set_state(&a, SlotState::Running);

        assert!(table.none_busy());
        table.set_busy(&a, true);
        assert!(!table.none_busy());
        table.set_busy(&a, false);
        assert!(table.none_busy());
    }

    #[test]
    fn termination_check() {
        let table = StateTable::new();
        let a = slot("a");
        table.set_state(&a, SlotState::Running);
        assert!(!table.all_terminated([&a]));
        table.set_state(&a, SlotState::Terminated);
        assert!(table.all_terminated([&a]));
    }
}
