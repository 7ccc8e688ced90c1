//! Bounded per-subscriber mailboxes.
//!
//! A mailbox is the back-pressure boundary between a producer and one
//! subscriber binding. It is effectively single-producer (one topic,
//! published from one host task) single-consumer (the subscriber's
//! host task):
//!
//! - `push` applies the overflow policy when full: `block` suspends
//!   the publisher until space frees, `drop_oldest` evicts the head,
//!   `drop_new` discards the incoming envelope.
//! - `recv` suspends the consumer until an envelope or close arrives.
//!
//! Closing a mailbox drains and counts its remaining contents; pushes
//! after close are rejected, which is what guarantees that no envelope
//! is delivered after a subscriber's teardown has begun.

use crate::Envelope;
use cascade_types::OverflowPolicy;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// Mailbox construction parameters.
#[derive(Debug, Clone, Copy)]
pub struct MailboxConfig {
    /// Bounded queue capacity; at least 1.
    pub capacity: usize,
    /// What a full mailbox does with the next envelope.
    pub policy: OverflowPolicy,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            policy: OverflowPolicy::Block,
        }
    }
}

/// Outcome of one push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Enqueued without waiting.
    Enqueued,
    /// Enqueued after the publisher suspended at least once.
    EnqueuedAfterBlock,
    /// Enqueued; the oldest queued envelope was evicted.
    DroppedOldest,
    /// The incoming envelope was discarded.
    DroppedNew,
    /// The mailbox is closed; nothing was enqueued.
    Closed,
}

impl PushOutcome {
    /// Returns `true` when the envelope ended up in the queue.
    #[must_use]
    pub fn was_enqueued(self) -> bool {
        matches!(
            self,
            Self::Enqueued | Self::EnqueuedAfterBlock | Self::DroppedOldest
        )
    }
}

#[derive(Debug)]
struct Inner {
    queue: Mutex<State>,
    capacity: usize,
    policy: OverflowPolicy,
    /// Signalled on push and on close; wakes the consumer.
    items: Notify,
    /// Signalled on pop and on close; wakes a blocked publisher.
    space: Notify,
    /// Signalled on every push; shared across a slot's mailboxes so
    /// the host can wait on all of its inputs at once.
    activity: Arc<Notify>,
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<Envelope>,
    closed: bool,
}

/// Handle to a bounded mailbox; clones share the queue.
#[derive(Debug, Clone)]
pub struct Mailbox {
    inner: Arc<Inner>,
}

impl Mailbox {
    /// Creates a mailbox wired to a shared activity notifier.
    #[must_use]
    pub fn new(config: MailboxConfig, activity: Arc<Notify>) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(State::default()),
                capacity: config.capacity.max(1),
                policy: config.policy,
                items: Notify::new(),
                space: Notify::new(),
                activity,
            }),
        }
    }

    /// Creates a mailbox with its own private activity notifier.
    #[must_use]
    pub fn standalone(config: MailboxConfig) -> Self {
        Self::new(config, Arc::new(Notify::new()))
    }

    /// Enqueues an envelope, applying the overflow policy when full.
    ///
    /// Under [`OverflowPolicy::Block`] this suspends until the
    /// consumer frees space or the mailbox closes.
    pub async fn push(&self, envelope: Envelope) -> PushOutcome {
        let mut blocked = false;
        loop {
            // Arm the space waiter before checking, so a pop between
            // the check and the await cannot be missed.
            let space = self.inner.space.notified();

            {
                let mut state = self.inner.queue.lock();
                if state.closed {
                    return PushOutcome::Closed;
                }
                if state.queue.len() < self.inner.capacity {
                    state.queue.push_back(envelope);
                    drop(state);
                    self.notify_pushed();
                    return if blocked {
                        PushOutcome::EnqueuedAfterBlock
                    } else {
                        PushOutcome::Enqueued
                    };
                }
                match self.inner.policy {
                    OverflowPolicy::Block => {}
                    OverflowPolicy::DropOldest => {
                        state.queue.pop_front();
                        state.queue.push_back(envelope);
                        drop(state);
                        self.notify_pushed();
                        return PushOutcome::DroppedOldest;
                    }
                    OverflowPolicy::DropNew => {
                        return PushOutcome::DroppedNew;
                    }
                }
            }

            blocked = true;
            space.await;
        }
    }

    fn notify_pushed(&self) {
        self.inner.items.notify_one();
        self.inner.activity.notify_one();
    }

    /// Receives the next envelope, suspending while the queue is
    /// empty. Returns `None` once the mailbox is closed and drained.
    pub async fn recv(&self) -> Option<Envelope> {
        loop {
            let items = self.inner.items.notified();

            {
                let mut state = self.inner.queue.lock();
                if let Some(envelope) = state.queue.pop_front() {
                    drop(state);
                    self.inner.space.notify_one();
                    return Some(envelope);
                }
                if state.closed {
                    return None;
                }
            }

            items.await;
        }
    }

    /// Non-blocking receive.
    #[must_use]
    pub fn try_recv(&self) -> Option<Envelope> {
        let mut state = self.inner.queue.lock();
        let envelope = state.queue.pop_front();
        if envelope.is_some() {
            self.inner.space.notify_one();
        }
        envelope
    }

    /// Closes the mailbox and discards its remaining contents,
    /// returning how many envelopes were dropped.
    ///
    /// Subsequent pushes return [`PushOutcome::Closed`]; a blocked
    /// publisher wakes and observes the close.
    pub fn close(&self) -> u64 {
        let dropped = {
            let mut state = self.inner.queue.lock();
            state.closed = true;
            let dropped = state.queue.len() as u64;
            state.queue.clear();
            dropped
        };
        if dropped > 0 {
            debug!(dropped, "Mailbox closed with queued envelopes");
        }
        self.inner.items.notify_waiters();
        self.inner.space.notify_waiters();
        self.inner.activity.notify_waiters();
        dropped
    }

    /// Number of queued envelopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.queue.lock().queue.len()
    }

    /// Returns `true` when no envelopes are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.queue.lock().closed
    }
}
