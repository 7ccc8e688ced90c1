//! Pipeline document model.
//!
//! A pipeline describes one run:
//!
//! ```yaml
//! pipeline:
//!   name: example
//!   execution: {max_threads: 8, timeout: 300s, retries: 2, error_policy: halt}
//!   modules:
//!     - {id: producer, name: src_mod, run_mode: once}
//!     - {id: consumer, name: dst_mod, depends_on: [producer],
//!        input: {data: producer.result}, run_mode: reactive}
//! ```
//!
//! Durations are written with a unit suffix (`300s`, `2m`, `500ms`,
//! `1h`). Input wiring maps a local input name to a `slot.output`
//! reference on the producing side.

use crate::PipelineError;
use cascade_types::{ErrorPolicy, ModuleName, OverflowPolicy, QualifiedTopic, RunMode, SlotId};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

/// Default mailbox capacity per subscription.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Default delay between `loop` iterations.
pub const DEFAULT_CYCLE_DELAY: Duration = Duration::from_secs(1);

/// Default per-slot grace period during shutdown.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Execution options of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionOptions {
    /// Maximum concurrent worker-pool threads.
    pub max_threads: usize,
    /// Overall pipeline timeout; `None` runs until quiescence or
    /// interrupt.
    #[serde(deserialize_with = "de_opt_duration")]
    pub timeout: Option<Duration>,
    /// How many times a faulting iteration is retried before the
    /// error policy applies.
    pub retries: u32,
    /// What a module fault does to the run.
    pub error_policy: ErrorPolicy,
    /// Default delay between `loop` iterations.
    #[serde(deserialize_with = "de_duration")]
    pub cycle_delay: Duration,
    /// Per-slot grace period during shutdown.
    #[serde(deserialize_with = "de_duration")]
    pub grace_period: Duration,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_threads: 4,
            timeout: None,
            retries: 0,
            error_policy: ErrorPolicy::default(),
            cycle_delay: DEFAULT_CYCLE_DELAY,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// Mailbox settings of one slot's subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxSpec {
    /// Bounded queue capacity.
    pub capacity: usize,
    /// What a full mailbox does with the next envelope.
    pub overflow: OverflowPolicy,
}

impl Default for MailboxSpec {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MAILBOX_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

/// One module slot within a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotSpec {
    /// Stable id, unique within the pipeline.
    pub id: SlotId,
    /// Manifest name to instantiate.
    pub name: ModuleName,
    /// Opaque configuration overrides passed to the module.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub config: HashMap<String, serde_json::Value>,
    /// Scheduling discipline.
    #[serde(default)]
    pub run_mode: RunMode,
    /// Explicit ordering constraints on other slots.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<SlotId>,
    /// Wiring: local input name to producing `slot.output`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub input: BTreeMap<String, QualifiedTopic>,
    /// Mailbox settings for this slot's subscriptions.
    #[serde(default)]
    pub mailbox: MailboxSpec,
    /// Per-slot override of the loop cycle delay.
    #[serde(default, deserialize_with = "de_opt_duration")]
    pub cycle_delay: Option<Duration>,
}

impl SlotSpec {
    /// Returns the effective dependency set: `depends_on` plus every
    /// slot this slot's inputs are wired to. Wiring is itself a
    /// dependency.
    #[must_use]
    pub fn effective_deps(&self) -> HashSet<&SlotId> {
        self.depends_on
            .iter()
            .chain(self.input.values().map(QualifiedTopic::slot))
            .collect()
    }
}

/// A parsed pipeline document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name.
    pub name: String,
    /// Execution options.
    #[serde(default)]
    pub execution: ExecutionOptions,
    /// Module slots in document order.
    pub modules: Vec<SlotSpec>,
}

/// The document root: `pipeline:` wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PipelineDoc {
    pub pipeline: Pipeline,
}

impl Pipeline {
    /// Looks up a slot by id.
    #[must_use]
    pub fn slot(&self, id: &SlotId) -> Option<&SlotSpec> {
        self.modules.iter().find(|s| s.id == *id)
    }

    /// Checks structural rules that do not need a manifest lookup:
    /// slot ids unique, dependency references resolve.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Invalid`] on violations.
    pub fn check_structure(&self) -> Result<(), PipelineError> {
        let mut ids = HashSet::new();
        for slot in &self.modules {
            if !ids.insert(&slot.id) {
                return Err(PipelineError::Invalid {
                    reason: format!("duplicate slot id '{}'", slot.id),
                });
            }
        }

        for slot in &self.modules {
            for dep in slot.effective_deps() {
                if !ids.contains(dep) {
                    return Err(PipelineError::Invalid {
                        reason: format!(
                            "slot '{}' depends on unknown slot '{}'",
                            slot.id, dep
                        ),
                    });
                }
            }
            if slot.effective_deps().contains(&slot.id) {
                return Err(PipelineError::Invalid {
                    reason: format!("slot '{}' depends on itself", slot.id),
                });
            }
        }

        Ok(())
    }
}

/// Parses a duration with unit suffix: `500ms`, `300s`, `2m`, `1h`.
///
/// # Errors
///
/// Returns a description of the malformed input.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit (ms, s, m, h)"))?;
    let (digits, unit) = s.split_at(split);
    let n: u64 = digits
        .parse()
        .map_err(|_| format!("duration '{s}' has no leading number"))?;
    match unit {
        "ms" => Ok(Duration::from_millis(n)),
        "s" => Ok(Duration::from_secs(n)),
        "m" => Ok(Duration::from_secs(n * 60)),
        "h" => Ok(Duration::from_secs(n * 3600)),
        other => Err(format!("duration '{s}' has unknown unit '{other}'")),
    }
}

fn de_duration<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
    let s = String::deserialize(de)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

fn de_opt_duration<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
    let s = Option::<String>::deserialize(de)?;
    s.map(|s| parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPELINE_YAML: &str = r"
pipeline:
  name: example
  execution: {max_threads: 8, timeout: 300s, retries: 2, error_policy: halt}
  modules:
    - {id: producer, name: src_mod, run_mode: once}
    - {id: consumer, name: dst_mod, depends_on: [producer],
       input: {data: producer.result}, run_mode: reactive}
";

    fn parse(yaml: &str) -> Pipeline {
        serde_yaml::from_str::<PipelineDoc>(yaml).unwrap().pipeline
    }

    #[test]
    fn parses_full_document() {
        let p = parse(PIPELINE_YAML);
        assert_eq!(p.name, "example");
        assert_eq!(p.execution.max_threads, 8);
        assert_eq!(p.execution.timeout, Some(Duration::from_secs(300)));
        assert_eq!(p.execution.retries, 2);
        assert_eq!(p.execution.error_policy, ErrorPolicy::Halt);
        assert_eq!(p.modules.len(), 2);

        let consumer = &p.modules[1];
        assert_eq!(consumer.run_mode, RunMode::Reactive);
        let wired = consumer.input.get("data").unwrap();
        assert_eq!(wired.slot().as_str(), "producer");
        assert_eq!(wired.output(), "result");
        p.check_structure().unwrap();
    }

    #[test]
    fn execution_defaults() {
        let p = parse("pipeline:\n  name: bare\n  modules: []\n");
        assert_eq!(p.execution, ExecutionOptions::default());
        assert_eq!(p.execution.max_threads, 4);
        assert_eq!(p.execution.cycle_delay, Duration::from_secs(1));
        assert_eq!(p.execution.grace_period, Duration::from_secs(10));
    }

    #[test]
    fn mailbox_defaults_and_overrides() {
        let yaml = r"
pipeline:
  name: mb
  modules:
    - {id: a, name: m}
    - {id: b, name: m, mailbox: {capacity: 2, overflow: drop_new}}
";
        let p = parse(yaml);
        assert_eq!(p.modules[0].mailbox, MailboxSpec::default());
        assert_eq!(p.modules[0].mailbox.capacity, 64);
        assert_eq!(p.modules[1].mailbox.capacity, 2);
        assert_eq!(p.modules[1].mailbox.overflow, OverflowPolicy::DropNew);
    }

    #[test]
    fn effective_deps_include_wiring() {
        let p = parse(PIPELINE_YAML);
        let deps = p.modules[1].effective_deps();
        assert_eq!(deps.len(), 1);
        assert!(deps.iter().any(|d| d.as_str() == "producer"));
    }

    #[test]
    fn duplicate_slot_id_rejected() {
        let yaml = r"
pipeline:
  name: dup
  modules:
    - {id: a, name: m}
    - {id: a, name: m}
";
        let err = parse(yaml).check_structure().unwrap_err();
        assert!(err.to_string().contains("duplicate slot id"));
    }

    #[test]
    fn unknown_dependency_rejected() {
        let yaml = r"
pipeline:
  name: ghost
  modules:
    - {id: a, name: m, depends_on: [phantom]}
";
        let err = parse(yaml).check_structure().unwrap_err();
        assert!(err.to_string().contains("phantom"));
    }

    #[test]
    fn self_dependency_rejected() {
        let yaml = r"
pipeline:
  name: selfish
  modules:
    - {id: a, name: m, depends_on: [a]}
";
        assert!(parse(yaml).check_structure().is_err());
    }

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("300s"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert!(parse_duration("300").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10d").is_err());
    }

    #[test]
    fn slot_cycle_delay_override() {
        let yaml = r"
pipeline:
  name: cy
  modules:
    - {id: a, name: m, run_mode: loop, cycle_delay: 250ms}
";
        let p = parse(yaml);
        assert_eq!(p.modules[0].cycle_delay, Some(Duration::from_millis(250)));
    }
}
