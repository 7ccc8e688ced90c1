//! The message bus.
//!
//! Wiring happens single-threaded through `&mut self`
//! ([`MessageBus::register_output`], [`MessageBus::subscribe`]); the
//! engine then wraps the bus in an `Arc` and the topic table is
//! read-only for the rest of the run. Publishing takes `&self`: the
//! only mutation on the hot path goes through mailboxes, the
//! translation cache, and the atomic counters.

use crate::topic::Topic;
use crate::{
    BusError, BusMetrics, Envelope, Mailbox, MailboxConfig, MetricsSnapshot, PushOutcome,
    SubscriberBinding, TranslationCache, DEFAULT_TRANSLATION_CACHE_SIZE,
};
use cascade_types::{OverflowPolicy, QualifiedTopic, RunMode, SlotId, TypeExpr, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Result of one publish call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Bindings the envelope was enqueued to.
    pub delivered: usize,
    /// Bindings skipped by translation failure.
    pub skipped: usize,
    /// Envelopes lost to `drop_oldest`/`drop_new` overflow.
    pub dropped: usize,
    /// Whether the publisher suspended on a full mailbox.
    pub suspended: bool,
}

/// Typed publish/subscribe bus with translation on delivery.
pub struct MessageBus {
    topics: HashMap<QualifiedTopic, Topic>,
    cache: TranslationCache,
    metrics: Arc<BusMetrics>,
}

impl MessageBus {
    /// Creates a bus with the default translation cache size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cache_size(DEFAULT_TRANSLATION_CACHE_SIZE)
    }

    /// Creates a bus with a specific translation cache capacity.
    #[must_use]
    pub fn with_cache_size(cache_size: usize) -> Self {
        Self {
            topics: HashMap::new(),
            cache: TranslationCache::new(cache_size),
            metrics: Arc::new(BusMetrics::new()),
        }
    }

    /// Registers a producer output as a topic.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::DuplicateTopic`] when the qualified name is
    /// already taken. Qualified names embed the slot id, so this only
    /// fires on a double registration of the same slot.
    pub fn register_output(
        &mut self,
        topic: QualifiedTopic,
        declared_type: TypeExpr,
    ) -> Result<(), BusError> {
        if self.topics.contains_key(&topic) {
            return Err(BusError::DuplicateTopic { topic });
        }
        debug!(%topic, ty = %declared_type, "Registered output topic");
        self.topics.insert(topic, Topic::new(declared_type));
        Ok(())
    }

    /// Subscribes a slot input to a topic, creating its mailbox.
    ///
    /// Idempotent per `(subscriber, input)`: re-subscribing replaces
    /// the previous binding. Returns the mailbox the host receives
    /// envelopes from.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownTopic`] when the topic was never
    /// registered.
    #[allow(clippy::too_many_arguments)]
    pub fn subscribe(
        &mut self,
        subscriber: SlotId,
        input: impl Into<String>,
        topic: &QualifiedTopic,
        expected_type: TypeExpr,
        run_mode: RunMode,
        mailbox: MailboxConfig,
        activity: Arc<Notify>,
    ) -> Result<Mailbox, BusError> {
        let input = input.into();

        // Idempotency: drop any previous binding for this
        // (subscriber, input) pair, wherever it pointed.
        for existing in self.topics.values_mut() {
            existing
                .subscribers
                .retain(|b| !(b.subscriber == subscriber && b.input == input));
        }

        let entry = self
            .topics
            .get_mut(topic)
            .ok_or_else(|| BusError::UnknownTopic {
                topic: topic.clone(),
            })?;

        let mailbox = Mailbox::new(mailbox, activity);
        debug!(%topic, subscriber = %subscriber, input = %input, "Subscribed");
        entry.subscribers.push(SubscriberBinding {
            subscriber,
            input,
            expected_type,
            run_mode,
            mailbox: mailbox.clone(),
        });
        Ok(mailbox)
    }

    /// Publishes a payload on `<source>.<output>`, fanning out to each
    /// binding in registration order.
    ///
    /// Per-delivery translation failures skip the affected binding and
    /// are counted; they never fail the publish. A topic with no
    /// subscribers drops the envelope (the bus has no retention).
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownTopic`] when the producer publishes
    /// an output that was never wired, which is a programming error in
    /// the producer, not a delivery failure.
    pub async fn publish(
        &self,
        source: &SlotId,
        output: &str,
        payload: Value,
    ) -> Result<PublishReport, BusError> {
        let qualified = QualifiedTopic::new(source.clone(), output);
        let topic = self
            .topics
            .get(&qualified)
            .ok_or_else(|| BusError::UnknownTopic {
                topic: qualified.clone(),
            })?;

        self.metrics.record_published();

        if topic.subscribers.is_empty() {
            debug!(topic = %qualified, "No subscribers, dropping");
            self.metrics.record_no_subscriber();
            return Ok(PublishReport::default());
        }

        let envelope = Envelope::new(payload, qualified, topic.declared_type.clone());
        let mut report = PublishReport::default();

        for binding in &topic.subscribers {
            let Some(outbound) = self.prepare(&envelope, &topic.declared_type, binding) else {
                report.skipped += 1;
                continue;
            };

            match binding.mailbox.push(outbound).await {
                PushOutcome::Enqueued => {
                    self.metrics.record_delivered();
                    report.delivered += 1;
                }
                PushOutcome::EnqueuedAfterBlock => {
                    self.metrics.record_delivered();
                    self.metrics.record_publisher_suspension();
                    report.delivered += 1;
                    report.suspended = true;
                }
                PushOutcome::DroppedOldest => {
                    self.metrics.record_delivered();
                    self.report_overflow(binding, OverflowPolicy::DropOldest);
                    report.delivered += 1;
                    report.dropped += 1;
                }
                PushOutcome::DroppedNew => {
                    self.report_overflow(binding, OverflowPolicy::DropNew);
                    report.dropped += 1;
                }
                PushOutcome::Closed => {
                    debug!(subscriber = %binding.subscriber, "Mailbox closed, skipping");
                    report.skipped += 1;
                }
            }
        }

        Ok(report)
    }

    /// Builds the per-subscriber envelope: addressed, and translated
    /// when the declared types differ. Returns `None` when the binding
    /// must be skipped.
    fn prepare(
        &self,
        envelope: &Envelope,
        declared: &TypeExpr,
        binding: &SubscriberBinding,
    ) -> Option<Envelope> {
        let addressed = envelope.addressed_to(&binding.input);
        if *declared == binding.expected_type {
            return Some(addressed);
        }

        let observed = envelope.payload().runtime_type();
        let Some(strategy) = self.cache.lookup(&observed, &binding.expected_type) else {
            self.report_translation_failure(envelope, binding, &observed, "no coercion rule");
            return None;
        };

        if strategy.is_identity() {
            // Keep the shared payload; only the type tag changes.
            return Some(addressed.translated_tag(binding.expected_type.clone()));
        }

        match strategy.apply(envelope.payload()) {
            Ok(translated) => {
                Some(addressed.translated(translated, binding.expected_type.clone()))
            }
            Err(e) => {
                self.report_translation_failure(envelope, binding, &observed, &e.reason);
                None
            }
        }
    }

    fn report_overflow(&self, binding: &SubscriberBinding, policy: OverflowPolicy) {
        self.metrics.record_overflow_dropped();
        let diagnostic = BusError::MailboxOverflow {
            subscriber: binding.subscriber.clone(),
            input: binding.input.clone(),
            policy,
        };
        warn!(%diagnostic, "Envelope dropped");
    }

    fn report_translation_failure(
        &self,
        envelope: &Envelope,
        binding: &SubscriberBinding,
        observed: &TypeExpr,
        reason: &str,
    ) {
        self.metrics.record_translation_failure();
        let diagnostic = BusError::TranslationFailed {
            topic: envelope.topic().clone(),
            subscriber: binding.subscriber.clone(),
            input: binding.input.clone(),
            src: observed.clone(),
            dst: binding.expected_type.clone(),
            reason: reason.to_string(),
        };
        warn!(%diagnostic, "Delivery skipped");
    }

    /// Closes every mailbox of `subscriber`, counting dropped
    /// envelopes. Called by the shutdown coordinator before the
    /// subscriber's teardown begins.
    pub fn close_subscriber(&self, subscriber: &SlotId) {
        for topic in self.topics.values() {
            for binding in &topic.subscribers {
                if binding.subscriber == *subscriber {
                    let dropped = binding.mailbox.close();
                    self.metrics.record_dropped_at_shutdown(dropped);
                }
            }
        }
    }

    /// Returns `true` when every mailbox on the bus is empty.
    #[must_use]
    pub fn all_mailboxes_empty(&self) -> bool {
        self.topics
            .values()
            .flat_map(|t| t.subscribers.iter())
            .all(|b| b.mailbox.is_empty())
    }

    /// Number of registered topics.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Shared counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A slot-scoped publishing handle, handed to modules through their
/// capabilities. Pre-qualifies every publish with the owning slot id.
#[derive(Clone)]
pub struct PublisherHandle {
    bus: Arc<MessageBus>,
    slot: SlotId,
}

impl PublisherHandle {
    /// Creates a handle publishing as `slot`.
    #[must_use]
    pub fn new(bus: Arc<MessageBus>, slot: SlotId) -> Self {
        Self { bus, slot }
    }

    /// Publishes a payload on this slot's `output`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::UnknownTopic`] when `output` is not one of
    /// the slot's wired outputs.
    pub async fn publish(&self, output: &str, payload: Value) -> Result<PublishReport, BusError> {
        self.bus.publish(&self.slot, output, payload).await
    }

    /// The slot this handle publishes as.
    #[must_use]
    pub fn slot(&self) -> &SlotId {
        &self.slot
    }
}
