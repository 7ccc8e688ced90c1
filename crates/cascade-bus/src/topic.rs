//! Topic table entries.

use crate::Mailbox;
use cascade_types::{RunMode, SlotId, TypeExpr};

/// One subscriber attached to a topic.
#[derive(Debug, Clone)]
pub struct SubscriberBinding {
    /// The subscribing slot.
    pub subscriber: SlotId,
    /// The subscriber's local input name.
    pub input: String,
    /// The subscriber's declared input type.
    pub expected_type: TypeExpr,
    /// The subscriber's run mode; delivery behaviour at the host side
    /// derives from it.
    pub run_mode: RunMode,
    /// The bounded queue envelopes are delivered into.
    pub mailbox: Mailbox,
}

/// One producer output on the bus.
#[derive(Debug)]
pub(crate) struct Topic {
    /// The producer's declared output type.
    pub declared_type: TypeExpr,
    /// Subscribers in registration order; fan-out follows this order.
    pub subscribers: Vec<SubscriberBinding>,
}

impl Topic {
    pub(crate) fn new(declared_type: TypeExpr) -> Self {
        Self {
            declared_type,
            subscribers: Vec::new(),
        }
    }
}
