//! The envelope wrapping every in-flight payload.
//!
//! Subscribers only ever observe envelopes; the payload is extracted
//! through [`Envelope::payload`]. Payloads are shared immutably across
//! the fan-out via `Arc`; translation replaces the `Arc` for the
//! affected binding only, so one subscriber's coercion never leaks
//! into another's view.

use cascade_types::{QualifiedTopic, SlotId, TypeExpr, Value};
use std::sync::Arc;
use std::time::Instant;

/// A payload in flight from a producer to one subscriber.
#[derive(Debug, Clone)]
pub struct Envelope {
    payload: Arc<Value>,
    topic: QualifiedTopic,
    /// Monotonic publication timestamp.
    timestamp: Instant,
    /// Declared type tag of the payload; updated on translation.
    data_type: TypeExpr,
    /// Destination input name, filled per subscriber at fan-out.
    input_name: Option<String>,
}

impl Envelope {
    /// Wraps a payload published on `topic` with declared type
    /// `data_type`, timestamped now.
    #[must_use]
    pub fn new(payload: Value, topic: QualifiedTopic, data_type: TypeExpr) -> Self {
        Self {
            payload: Arc::new(payload),
            topic,
            timestamp: Instant::now(),
            data_type,
            input_name: None,
        }
    }

    /// The payload. This accessor is the stable extraction point for
    /// modules.
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Shared handle to the payload.
    #[must_use]
    pub fn payload_arc(&self) -> Arc<Value> {
        Arc::clone(&self.payload)
    }

    /// The qualified topic this envelope was published on.
    #[must_use]
    pub fn topic(&self) -> &QualifiedTopic {
        &self.topic
    }

    /// The slot that published this envelope.
    #[must_use]
    pub fn source_slot(&self) -> &SlotId {
        self.topic.slot()
    }

    /// Monotonic publication timestamp.
    #[must_use]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// The declared type tag of the payload.
    #[must_use]
    pub fn data_type(&self) -> &TypeExpr {
        &self.data_type
    }

    /// The destination input name, present once fanned out.
    #[must_use]
    pub fn input_name(&self) -> Option<&str> {
        self.input_name.as_deref()
    }

    /// Returns a per-subscriber copy addressed to `input`, sharing the
    /// payload.
    #[must_use]
    pub fn addressed_to(&self, input: &str) -> Self {
        Self {
            payload: Arc::clone(&self.payload),
            topic: self.topic.clone(),
            timestamp: self.timestamp,
            data_type: self.data_type.clone(),
            input_name: Some(input.to_string()),
        }
    }

    /// Returns a copy with only the type tag updated, sharing the
    /// payload. Used for identity translations (e.g. into `any`).
    #[must_use]
    pub fn translated_tag(&self, data_type: TypeExpr) -> Self {
        Self {
            payload: Arc::clone(&self.payload),
            topic: self.topic.clone(),
            timestamp: self.timestamp,
            data_type,
            input_name: self.input_name.clone(),
        }
    }

    /// Returns a copy with the payload replaced by its translated form
    /// and the type tag updated.
    #[must_use]
    pub fn translated(&self, payload: Value, data_type: TypeExpr) -> Self {
        Self {
            payload: Arc::new(payload),
            topic: self.topic.clone(),
            timestamp: self.timestamp,
            data_type,
            input_name: self.input_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic() -> QualifiedTopic {
        QualifiedTopic::parse("producer.result").unwrap()
    }

    #[test]
    fn envelope_carries_metadata() {
        let before = Instant::now();
        let env = Envelope::new(Value::Int(3), topic(), TypeExpr::Int);

        assert_eq!(env.payload(), &Value::Int(3));
        assert_eq!(env.source_slot().as_str(), "producer");
        assert_eq!(env.topic().output(), "result");
        assert_eq!(env.data_type(), &TypeExpr::Int);
        assert!(env.timestamp() >= before);
        assert!(env.input_name().is_none());
    }

    #[test]
    fn addressing_shares_payload() {
        let env = Envelope::new(Value::Int(3), topic(), TypeExpr::Int);
        let addressed = env.addressed_to("data");

        assert_eq!(addressed.input_name(), Some("data"));
        assert_eq!(addressed.timestamp(), env.timestamp());
        assert!(Arc::ptr_eq(&env.payload_arc(), &addressed.payload_arc()));
    }

    #[test]
    fn translation_replaces_payload_and_tag() {
        let env = Envelope::new(Value::Int(3), topic(), TypeExpr::Int).addressed_to("data");
        let translated = env.translated(Value::Float(3.0), TypeExpr::Float);

        assert_eq!(translated.payload(), &Value::Float(3.0));
        assert_eq!(translated.data_type(), &TypeExpr::Float);
        assert_eq!(translated.input_name(), Some("data"));
        // The original view is untouched.
        assert_eq!(env.payload(), &Value::Int(3));
        assert_eq!(env.data_type(), &TypeExpr::Int);
    }
}
