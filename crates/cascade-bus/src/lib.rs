//! Typed in-process publish/subscribe bus.
//!
//! Every producer output becomes a topic keyed `<slot>.<output>`.
//! Subscribers attach bounded mailboxes to topics through the
//! pipeline's wiring; publishing fans an [`Envelope`] out to each
//! binding, translating the payload when the declared types differ:
//!
//! ```text
//!            publish(slot, output, value)
//!                      │
//!              wrap in Envelope
//!                      │
//!        ┌─────────────┼─────────────┐
//!        ▼             ▼             ▼
//!   binding #1    binding #2    binding #3
//!   types match   translate     no rule:
//!   deliver as-is and deliver   skip + count
//!        │             │
//!   [mailbox]      [mailbox]     ← bounded, overflow policy
//!        │             │
//!    host recv     host recv
//! ```
//!
//! The topic table is written only during wiring and read-only while
//! the pipeline runs; the translation LRU cache is the only
//! write-shared structure on the hot path.

mod bus;
mod cache;
mod envelope;
mod error;
mod mailbox;
mod metrics;
mod topic;

pub use bus::{MessageBus, PublishReport, PublisherHandle};
pub use cache::{TranslationCache, DEFAULT_TRANSLATION_CACHE_SIZE};
pub use envelope::Envelope;
pub use error::BusError;
pub use mailbox::{Mailbox, MailboxConfig, PushOutcome};
pub use metrics::{BusMetrics, MetricsSnapshot};
pub use topic::SubscriberBinding;
