//! Dependency-graph validation.
//!
//! Kahn-style topological reduction over the slot graph. The effective
//! dependency set of a slot is its `depends_on` list plus every slot
//! its inputs are wired to. The layering is reused by the engine: init
//! runs layer by layer, shutdown in reverse.

use crate::{Pipeline, PipelineError};
use cascade_types::SlotId;
use std::collections::{BTreeMap, BTreeSet};

/// Computes the Kahn layering of a pipeline's slot graph.
///
/// Layer 0 holds slots with no dependencies; layer N holds slots whose
/// dependencies all live in layers < N. Slots within a layer are
/// sorted for deterministic output.
///
/// # Errors
///
/// Returns [`PipelineError::Cycle`] listing the slots left over after
/// reduction when the graph is cyclic.
pub fn topo_layers(pipeline: &Pipeline) -> Result<Vec<Vec<SlotId>>, PipelineError> {
    // BTreeMaps keep iteration deterministic across runs.
    let mut pending: BTreeMap<&SlotId, BTreeSet<&SlotId>> = pipeline
        .modules
        .iter()
        .map(|slot| (&slot.id, slot.effective_deps().into_iter().collect()))
        .collect();

    let mut layers: Vec<Vec<SlotId>> = Vec::new();
    let mut resolved: BTreeSet<&SlotId> = BTreeSet::new();

    while !pending.is_empty() {
        let ready: Vec<&SlotId> = pending
            .iter()
            .filter(|(_, deps)| deps.iter().all(|d| resolved.contains(d)))
            .map(|(id, _)| *id)
            .collect();

        if ready.is_empty() {
            let mut nodes: Vec<SlotId> = pending.keys().map(|id| (*id).clone()).collect();
            nodes.sort();
            return Err(PipelineError::Cycle { nodes });
        }

        for id in &ready {
            pending.remove(*id);
            resolved.insert(*id);
        }
        layers.push(ready.into_iter().cloned().collect());
    }

    Ok(layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SlotSpec;
    use cascade_types::QualifiedTopic;

    fn slot(id: &str, deps: &[&str]) -> SlotSpec {
        SlotSpec {
            id: id.parse().unwrap(),
            name: "m".parse().unwrap(),
            config: Default::default(),
            run_mode: Default::default(),
            depends_on: deps.iter().map(|d| d.parse().unwrap()).collect(),
            input: Default::default(),
            mailbox: Default::default(),
            cycle_delay: None,
        }
    }

    fn pipeline(slots: Vec<SlotSpec>) -> Pipeline {
        Pipeline {
            name: "test".into(),
            execution: Default::default(),
            modules: slots,
        }
    }

    fn ids(layer: &[SlotId]) -> Vec<&str> {
        layer.iter().map(SlotId::as_str).collect()
    }

    #[test]
    fn linear_chain_layers() {
        let p = pipeline(vec![
            slot("a", &[]),
            slot("b", &["a"]),
            slot("c", &["b"]),
        ]);
        let layers = topo_layers(&p).unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(ids(&layers[0]), ["a"]);
        assert_eq!(ids(&layers[1]), ["b"]);
        assert_eq!(ids(&layers[2]), ["c"]);
    }

    #[test]
    fn diamond_layers() {
        let p = pipeline(vec![
            slot("src", &[]),
            slot("left", &["src"]),
            slot("right", &["src"]),
            slot("sink", &["left", "right"]),
        ]);
        let layers = topo_layers(&p).unwrap();
        assert_eq!(layers.len(), 3);
        assert_eq!(ids(&layers[0]), ["src"]);
        assert_eq!(ids(&layers[1]), ["left", "right"]);
        assert_eq!(ids(&layers[2]), ["sink"]);
    }

    #[test]
    fn two_node_cycle_reported() {
        let p = pipeline(vec![slot("a", &["b"]), slot("b", &["a"])]);
        let err = topo_layers(&p).unwrap_err();
        match err {
            PipelineError::Cycle { nodes } => {
                assert_eq!(
                    nodes,
                    vec!["a".parse::<SlotId>().unwrap(), "b".parse().unwrap()]
                );
            }
            other => panic!("expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn cycle_excludes_reachable_prefix() {
        // `head` resolves; only the cyclic residue is reported.
        let p = pipeline(vec![
            slot("head", &[]),
            slot("a", &["head", "b"]),
            slot("b", &["a"]),
        ]);
        let err = topo_layers(&p).unwrap_err();
        match err {
            PipelineError::Cycle { nodes } => {
                assert_eq!(ids(&nodes), ["a", "b"]);
            }
            other => panic!("expected Cycle, got {other:?}"),
        }
    }

    #[test]
    fn wiring_counts_as_dependency() {
        let mut consumer = slot("consumer", &[]);
        consumer.input.insert(
            "data".into(),
            QualifiedTopic::parse("producer.out").unwrap(),
        );
        let p = pipeline(vec![consumer, slot("producer", &[])]);
        let layers = topo_layers(&p).unwrap();
        assert_eq!(ids(&layers[0]), ["producer"]);
        assert_eq!(ids(&layers[1]), ["consumer"]);
    }

    #[test]
    fn empty_pipeline_is_trivially_acyclic() {
        let p = pipeline(vec![]);
        assert!(topo_layers(&p).unwrap().is_empty());
    }
}
