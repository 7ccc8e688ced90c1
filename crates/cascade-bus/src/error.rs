//! Bus errors and per-delivery diagnostics.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`BusError::UnknownTopic`] | `BUS_UNKNOWN_TOPIC` | No |
//! | [`BusError::DuplicateTopic`] | `BUS_DUPLICATE_TOPIC` | No |
//! | [`BusError::TranslationFailed`] | `BUS_TRANSLATION_FAILED` | No |
//! | [`BusError::MailboxOverflow`] | `BUS_MAILBOX_OVERFLOW` | Yes |
//!
//! Translation failures and overflows are per-delivery: the bus
//! records them and continues, never failing the publish call. They
//! appear as `BusError` values only in diagnostics.

use cascade_types::{ErrorCode, OverflowPolicy, QualifiedTopic, Severity, SlotId, TypeExpr};
use thiserror::Error;

/// Bus-layer error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BusError {
    /// A publish or subscribe referenced a topic that was never
    /// registered during wiring.
    #[error("unknown topic '{topic}'")]
    UnknownTopic {
        /// The unregistered topic.
        topic: QualifiedTopic,
    },

    /// An output was registered twice during wiring.
    #[error("topic '{topic}' is already registered")]
    DuplicateTopic {
        /// The duplicated topic.
        topic: QualifiedTopic,
    },

    /// A full mailbox dropped an envelope under a non-blocking
    /// overflow policy. The subscriber remains running.
    #[error("mailbox overflow on {subscriber}.{input} under '{policy}'")]
    MailboxOverflow {
        /// The subscriber whose mailbox overflowed.
        subscriber: SlotId,
        /// The affected input.
        input: String,
        /// The policy that resolved the overflow.
        policy: OverflowPolicy,
    },

    /// A delivery could not be translated; the binding was skipped.
    #[error("translation failed on '{topic}' for {subscriber}.{input}: {src} -> {dst}: {reason}")]
    TranslationFailed {
        /// Topic the envelope was published on.
        topic: QualifiedTopic,
        /// The skipped subscriber.
        subscriber: SlotId,
        /// The subscriber's input name.
        input: String,
        /// Observed source type.
        src: TypeExpr,
        /// Declared destination type.
        dst: TypeExpr,
        /// What went wrong.
        reason: String,
    },
}

impl ErrorCode for BusError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownTopic { .. } => "BUS_UNKNOWN_TOPIC",
            Self::DuplicateTopic { .. } => "BUS_DUPLICATE_TOPIC",
            Self::MailboxOverflow { .. } => "BUS_MAILBOX_OVERFLOW",
            Self::TranslationFailed { .. } => "BUS_TRANSLATION_FAILED",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::MailboxOverflow { .. })
    }

    fn severity(&self) -> Severity {
        match self {
            // Wiring errors stop the run before it starts.
            Self::UnknownTopic { .. } | Self::DuplicateTopic { .. } => Severity::Config,
            Self::MailboxOverflow { .. } | Self::TranslationFailed { .. } => Severity::Pipeline,
        }
    }
}
