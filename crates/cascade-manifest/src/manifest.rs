//! Module manifest model.
//!
//! A manifest (`module.yaml`) describes one module on disk:
//!
//! ```yaml
//! name: urlclean
//! alias: URL Cleaner
//! creator: example
//! version: 1.2.0
//! description: Normalises and deduplicates crawled URLs.
//! runtime:
//!   main: src/main
//! requirements:
//!   - name: urllib
//!     version: "2.1"
//! inputs:
//!   - name: raw_urls
//!     type: list<str>
//!     description: URLs as produced by the crawler.
//! outputs:
//!   - name: clean_urls
//!     type: set<str>
//!     description: Deduplicated, normalised URLs.
//! ```
//!
//! Identifiers and type expressions are validated during
//! deserialisation; [`ModuleManifest::validate`] adds the cross-field
//! rules (unique port names, at most one trigger input, well-formed
//! version).

use crate::ManifestError;
use cascade_types::{ModuleName, TypeExpr};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One declared input or output of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDef {
    /// Port name, unique among the manifest's inputs or outputs.
    pub name: String,
    /// Declared type expression.
    #[serde(rename = "type")]
    pub ty: TypeExpr,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Marks the trigger input of an `on_trigger` slot. At most one
    /// input per manifest may set this.
    #[serde(default)]
    pub trigger: bool,
}

/// Entry points of the module inside its directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSpec {
    /// Relative path of the main entry point.
    pub main: String,
    /// Relative paths of test entry points.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<String>,
}

/// A dependency declared by the module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    /// Dependency name.
    pub name: String,
    /// Version constraint, passed through uninterpreted.
    pub version: String,
}

/// A parsed and validated module manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleManifest {
    /// Unique module name; resolves to a directory via the registry.
    pub name: ModuleName,
    /// Display alias.
    #[serde(default)]
    pub alias: String,
    /// Author.
    #[serde(default)]
    pub creator: String,
    /// Semantic version, `MAJOR.MINOR.PATCH`.
    pub version: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Optional upstream repository URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Entry points.
    pub runtime: RuntimeSpec,
    /// Declared dependencies.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<Requirement>,
    /// Declared inputs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<PortDef>,
    /// Declared outputs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<PortDef>,
}

impl ModuleManifest {
    /// Checks the cross-field rules serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] on duplicate input/output names, more
    /// than one trigger input, or a malformed version string.
    pub fn validate(&self) -> Result<(), ManifestError> {
        check_unique(&self.name, "input", &self.inputs)?;
        check_unique(&self.name, "output", &self.outputs)?;

        if self.inputs.iter().filter(|p| p.trigger).count() > 1 {
            return Err(ManifestError::MultipleTriggers {
                module: self.name.clone(),
            });
        }

        if !version_well_formed(&self.version) {
            return Err(ManifestError::Invalid {
                path: Default::default(),
                reason: format!(
                    "module '{}' has malformed version '{}': expected MAJOR.MINOR.PATCH",
                    self.name, self.version
                ),
            });
        }

        Ok(())
    }

    /// Looks up a declared input by name.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.name == name)
    }

    /// Looks up a declared output by name.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// Returns the input marked `trigger: true`, if any.
    #[must_use]
    pub fn trigger_input(&self) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.trigger)
    }
}

fn check_unique(
    module: &ModuleName,
    kind: &'static str,
    ports: &[PortDef],
) -> Result<(), ManifestError> {
    let mut seen = HashSet::new();
    for port in ports {
        if !seen.insert(port.name.as_str()) {
            return Err(ManifestError::DuplicatePort {
                module: module.clone(),
                kind,
                port: port.name.clone(),
            });
        }
    }
    Ok(())
}

fn version_well_formed(v: &str) -> bool {
    let mut parts = v.split('.');
    let triple = (parts.next(), parts.next(), parts.next(), parts.next());
    match triple {
        (Some(a), Some(b), Some(c), None) => [a, b, c]
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit())),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST_YAML: &str = r"
name: urlclean
alias: URL Cleaner
creator: example
version: 1.2.0
description: Normalises URLs.
runtime:
  main: src/main
requirements:
  - name: urllib
    version: '2.1'
inputs:
  - name: raw_urls
    type: list<str>
    description: Crawled URLs.
outputs:
  - name: clean_urls
    type: set<str>
    description: Deduplicated URLs.
";

    fn parse(yaml: &str) -> ModuleManifest {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn parses_full_manifest() {
        let m = parse(MANIFEST_YAML);
        assert_eq!(m.name.as_str(), "urlclean");
        assert_eq!(m.alias, "URL Cleaner");
        assert_eq!(m.runtime.main, "src/main");
        assert_eq!(m.requirements.len(), 1);
        assert_eq!(m.inputs[0].ty, "list<str>".parse().unwrap());
        assert_eq!(m.outputs[0].ty, "set<str>".parse().unwrap());
        m.validate().unwrap();
    }

    #[test]
    fn port_lookup() {
        let m = parse(MANIFEST_YAML);
        assert!(m.input("raw_urls").is_some());
        assert!(m.input("clean_urls").is_none());
        assert!(m.output("clean_urls").is_some());
        assert!(m.trigger_input().is_none());
    }

    #[test]
    fn rejects_bad_type_expression() {
        let yaml = MANIFEST_YAML.replace("list<str>", "lost<str>");
        assert!(serde_yaml::from_str::<ModuleManifest>(&yaml).is_err());
    }

    #[test]
    fn rejects_uppercase_name() {
        let yaml = MANIFEST_YAML.replace("name: urlclean", "name: UrlClean");
        assert!(serde_yaml::from_str::<ModuleManifest>(&yaml).is_err());
    }

    #[test]
    fn rejects_duplicate_input_names() {
        let yaml = r"
name: dup
version: 0.1.0
runtime: {main: src/main}
inputs:
  - {name: x, type: str}
  - {name: x, type: int}
";
        let m = parse(yaml);
        let err = m.validate().unwrap_err();
        assert!(matches!(err, ManifestError::DuplicatePort { kind: "input", .. }));
    }

    #[test]
    fn rejects_multiple_triggers() {
        let yaml = r"
name: trig
version: 0.1.0
runtime: {main: src/main}
inputs:
  - {name: a, type: str, trigger: true}
  - {name: b, type: str, trigger: true}
";
        let m = parse(yaml);
        assert!(matches!(
            m.validate().unwrap_err(),
            ManifestError::MultipleTriggers { .. }
        ));
    }

    #[test]
    fn single_trigger_resolves() {
        let yaml = r"
name: trig
version: 0.1.0
runtime: {main: src/main}
inputs:
  - {name: fire, type: any, trigger: true}
  - {name: data, type: str}
";
        let m = parse(yaml);
        m.validate().unwrap();
        assert_eq!(m.trigger_input().map(|p| p.name.as_str()), Some("fire"));
    }

    #[test]
    fn version_format() {
        assert!(version_well_formed("0.1.0"));
        assert!(version_well_formed("10.20.30"));
        assert!(!version_well_formed("1.0"));
        assert!(!version_well_formed("1.0.0.0"));
        assert!(!version_well_formed("1.0.x"));
        assert!(!version_well_formed(""));
    }

    #[test]
    fn rejects_malformed_version() {
        let yaml = MANIFEST_YAML.replace("version: 1.2.0", "version: '1.2'");
        let m = parse(yaml.as_str());
        assert!(m.validate().is_err());
    }
}
