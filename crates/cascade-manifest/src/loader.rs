//! Document loading and semantic validation.
//!
//! [`load_manifest`] and [`load_pipeline`] read the YAML documents
//! from disk. Pipeline loading additionally validates the document
//! against the set of discovered manifests, supplied through the
//! [`ManifestLookup`] seam so the loader stays testable without a
//! module registry.

use crate::pipeline::PipelineDoc;
use crate::{
    topo_layers, ManifestError, ModuleManifest, Pipeline, PipelineError,
};
use cascade_types::{types_compatible, ModuleName, RunMode};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Resolves a module name to its discovered manifest.
///
/// Implemented by the runtime's module registry; tests use the
/// blanket impl on a plain map.
pub trait ManifestLookup {
    /// Returns the manifest discovered under `name`, if any.
    fn manifest(&self, name: &ModuleName) -> Option<&ModuleManifest>;
}

impl ManifestLookup for HashMap<ModuleName, ModuleManifest> {
    fn manifest(&self, name: &ModuleName) -> Option<&ModuleManifest> {
        self.get(name)
    }
}

/// Loads and validates a module manifest from `path`.
///
/// # Errors
///
/// Returns [`ManifestError`] when the file cannot be read, fails to
/// parse, or breaks a manifest rule (duplicate port names, multiple
/// trigger inputs, malformed version).
pub fn load_manifest(path: &Path) -> Result<ModuleManifest, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let manifest: ModuleManifest =
        serde_yaml::from_str(&content).map_err(|e| ManifestError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    manifest.validate()?;
    debug!(module = %manifest.name, path = %path.display(), "Loaded manifest");
    Ok(manifest)
}

/// Loads a pipeline document from `path` and validates it against the
/// discovered manifests.
///
/// # Errors
///
/// Returns [`PipelineError`] on read/parse failure or any semantic
/// violation (see [`validate_pipeline`]).
pub fn load_pipeline(
    path: &Path,
    manifests: &dyn ManifestLookup,
) -> Result<Pipeline, PipelineError> {
    let content = std::fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let doc: PipelineDoc = serde_yaml::from_str(&content).map_err(|e| PipelineError::Invalid {
        reason: format!("{}: {e}", path.display()),
    })?;

    let pipeline = doc.pipeline;
    validate_pipeline(&pipeline, manifests)?;
    debug!(
        pipeline = %pipeline.name,
        slots = pipeline.modules.len(),
        "Loaded pipeline"
    );
    Ok(pipeline)
}

/// Semantic validation of an already parsed pipeline.
///
/// Checks, in order:
///
/// 1. Structural rules: unique slot ids, dependency references resolve.
/// 2. Every slot's `name` resolves to a discovered manifest.
/// 3. Every input binding: the local input is declared by the consumer,
///    the producing slot declares the named output, and the output
///    type is compatible with the input type under the coercion rules.
/// 4. `on_trigger` slots name a manifest input with `trigger: true`.
/// 5. The slot graph is acyclic.
///
/// # Errors
///
/// Returns the first [`PipelineError`] encountered.
pub fn validate_pipeline(
    pipeline: &Pipeline,
    manifests: &dyn ManifestLookup,
) -> Result<(), PipelineError> {
    pipeline.check_structure()?;

    for slot in &pipeline.modules {
        let manifest =
            manifests
                .manifest(&slot.name)
                .ok_or_else(|| PipelineError::UnknownModule {
                    slot: slot.id.clone(),
                    module: slot.name.clone(),
                })?;

        for (input_name, wired) in &slot.input {
            let input = manifest.input(input_name).ok_or_else(|| {
                PipelineError::UnknownInput {
                    slot: slot.id.clone(),
                    input: input_name.clone(),
                }
            })?;

            // The producing slot exists (check_structure guarantees the
            // id resolves); its manifest must declare the output.
            let producer_slot = pipeline.slot(wired.slot()).ok_or_else(|| {
                PipelineError::Invalid {
                    reason: format!(
                        "slot '{}' input '{}' wired to unknown slot '{}'",
                        slot.id,
                        input_name,
                        wired.slot()
                    ),
                }
            })?;
            let producer_manifest = manifests.manifest(&producer_slot.name).ok_or_else(|| {
                PipelineError::UnknownModule {
                    slot: producer_slot.id.clone(),
                    module: producer_slot.name.clone(),
                }
            })?;

            let output = producer_manifest.output(wired.output()).ok_or_else(|| {
                PipelineError::UnknownOutput {
                    slot: slot.id.clone(),
                    input: input_name.clone(),
                    producer: wired.slot().clone(),
                    output: wired.output().to_string(),
                }
            })?;

            if !types_compatible(&output.ty, &input.ty) {
                return Err(PipelineError::TypeIncompatible {
                    slot: slot.id.clone(),
                    input: input_name.clone(),
                    src: output.ty.clone(),
                    dst: input.ty.clone(),
                });
            }
        }

        if slot.run_mode == RunMode::OnTrigger && manifest.trigger_input().is_none() {
            return Err(PipelineError::MissingTrigger {
                slot: slot.id.clone(),
                module: slot.name.clone(),
            });
        }
    }

    topo_layers(pipeline)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_types::ErrorCode;
    use std::io::Write;
    use tempfile::TempDir;

    fn manifest(yaml: &str) -> ModuleManifest {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn lookup() -> HashMap<ModuleName, ModuleManifest> {
        let src = manifest(
            r"
name: src_mod
version: 0.1.0
runtime: {main: src/main}
outputs:
  - {name: result, type: int}
",
        );
        let dst = manifest(
            r"
name: dst_mod
version: 0.1.0
runtime: {main: src/main}
inputs:
  - {name: data, type: float}
",
        );
        let mut map = HashMap::new();
        map.insert(src.name.clone(), src);
        map.insert(dst.name.clone(), dst);
        map
    }

    fn pipeline(yaml: &str) -> Pipeline {
        serde_yaml::from_str::<crate::pipeline::PipelineDoc>(yaml)
            .unwrap()
            .pipeline
    }

    const WIRED: &str = r"
pipeline:
  name: example
  modules:
    - {id: producer, name: src_mod, run_mode: once}
    - {id: consumer, name: dst_mod, depends_on: [producer],
       input: {data: producer.result}, run_mode: reactive}
";

    #[test]
    fn valid_pipeline_passes() {
        // int output wired to float input: coercible at wiring time.
        validate_pipeline(&pipeline(WIRED), &lookup()).unwrap();
    }

    #[test]
    fn unknown_module_rejected() {
        let p = pipeline(
            r"
pipeline:
  name: ghost
  modules:
    - {id: a, name: no_such_mod}
",
        );
        let err = validate_pipeline(&p, &lookup()).unwrap_err();
        assert_eq!(err.code(), "PIPELINE_UNKNOWN_MODULE");
    }

    #[test]
    fn unknown_output_rejected() {
        let p = pipeline(&WIRED.replace("producer.result", "producer.nope"));
        let err = validate_pipeline(&p, &lookup()).unwrap_err();
        assert_eq!(err.code(), "PIPELINE_UNKNOWN_OUTPUT");
    }

    #[test]
    fn unknown_input_rejected() {
        let p = pipeline(&WIRED.replace("data:", "nonsense:"));
        let err = validate_pipeline(&p, &lookup()).unwrap_err();
        assert_eq!(err.code(), "PIPELINE_UNKNOWN_INPUT");
    }

    #[test]
    fn incompatible_types_rejected() {
        let mut manifests = lookup();
        let strict = manifest(
            r"
name: dst_mod
version: 0.1.0
runtime: {main: src/main}
inputs:
  - {name: data, type: bool}
",
        );
        manifests.insert(strict.name.clone(), strict);

        let err = validate_pipeline(&pipeline(WIRED), &manifests).unwrap_err();
        assert_eq!(err.code(), "PIPELINE_TYPE_INCOMPATIBLE");
        assert!(err.to_string().contains("int"));
        assert!(err.to_string().contains("bool"));
    }

    #[test]
    fn cycle_rejected_before_any_module_runs() {
        let mut manifests = lookup();
        let free = manifest(
            r"
name: free_mod
version: 0.1.0
runtime: {main: src/main}
",
        );
        manifests.insert(free.name.clone(), free);

        let p = pipeline(
            r"
pipeline:
  name: cyclic
  modules:
    - {id: a, name: free_mod, depends_on: [b]}
    - {id: b, name: free_mod, depends_on: [a]}
",
        );
        let err = validate_pipeline(&p, &manifests).unwrap_err();
        assert_eq!(err.code(), "PIPELINE_CYCLE");
    }

    #[test]
    fn on_trigger_requires_trigger_input() {
        let mut manifests = lookup();
        let no_trigger = manifest(
            r"
name: waiting_mod
version: 0.1.0
runtime: {main: src/main}
inputs:
  - {name: fire, type: any}
",
        );
        manifests.insert(no_trigger.name.clone(), no_trigger);

        let p = pipeline(
            r"
pipeline:
  name: trig
  modules:
    - {id: w, name: waiting_mod, run_mode: on_trigger}
",
        );
        let err = validate_pipeline(&p, &manifests).unwrap_err();
        assert_eq!(err.code(), "PIPELINE_MISSING_TRIGGER");

        // With the trigger flag present, validation passes.
        let with_trigger = manifest(
            r"
name: waiting_mod
version: 0.1.0
runtime: {main: src/main}
inputs:
  - {name: fire, type: any, trigger: true}
",
        );
        manifests.insert(with_trigger.name.clone(), with_trigger);
        validate_pipeline(&p, &manifests).unwrap();
    }

    #[test]
    fn load_manifest_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("module.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            "name: disk_mod\nversion: 1.0.0\nruntime: {{main: src/main}}\n"
        )
        .unwrap();

        let m = load_manifest(&path).unwrap();
        assert_eq!(m.name.as_str(), "disk_mod");
    }

    #[test]
    fn load_manifest_missing_file() {
        let err = load_manifest(Path::new("/nonexistent/module.yaml")).unwrap_err();
        assert_eq!(err.code(), "MANIFEST_IO");
    }

    #[test]
    fn load_pipeline_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("example.yaml");
        std::fs::write(&path, WIRED).unwrap();

        let p = load_pipeline(&path, &lookup()).unwrap();
        assert_eq!(p.name, "example");
    }

    #[test]
    fn load_pipeline_bad_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "pipeline: [not, a, mapping]").unwrap();

        let err = load_pipeline(&path, &lookup()).unwrap_err();
        assert_eq!(err.code(), "PIPELINE_INVALID");
    }
}
