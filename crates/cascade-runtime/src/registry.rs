//! Module discovery.
//!
//! Scans each configured module root's immediate subdirectories for a
//! readable `module.yaml`, loads the manifest, and attaches the
//! verification verdict. Unreadable or invalid manifests are skipped
//! with a warning so one broken directory cannot take down discovery.
//!
//! Roots are scanned in order and the first occurrence of a module
//! name wins; later duplicates are logged and ignored.

use crate::EngineError;
use cascade_manifest::{load_manifest, ManifestLookup, ModuleManifest};
use cascade_security::{verify_module, TrustedSigners, Verdict};
use cascade_types::ModuleName;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The manifest file name inside a module directory.
pub const MANIFEST_FILE: &str = "module.yaml";

/// One discovered module.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    /// The module directory.
    pub path: PathBuf,
    /// Its parsed manifest.
    pub manifest: ModuleManifest,
    /// Its verification verdict.
    pub verdict: Verdict,
}

/// The set of discovered modules, keyed by manifest name.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    records: BTreeMap<ModuleName, ModuleRecord>,
}

impl ModuleRegistry {
    /// Scans `roots` and verifies every discovered module against
    /// `signers`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] only when a root exists but cannot be
    /// listed, or verification hits an I/O failure; malformed
    /// individual modules are skipped. Missing roots are skipped with
    /// a warning.
    pub fn discover(roots: &[PathBuf], signers: &TrustedSigners) -> Result<Self, EngineError> {
        let mut registry = Self::default();

        for root in roots {
            if !root.is_dir() {
                warn!(root = %root.display(), "Module root missing, skipping");
                continue;
            }
            registry.scan_root(root, signers)?;
        }

        debug!(count = registry.records.len(), "Module discovery complete");
        Ok(registry)
    }

    fn scan_root(&mut self, root: &Path, signers: &TrustedSigners) -> Result<(), EngineError> {
        let entries = std::fs::read_dir(root)
            .map_err(|e| cascade_security::SecurityError::Io {
                path: root.to_path_buf(),
                source: e,
            })?;

        for entry in entries.flatten() {
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            let manifest_path = dir.join(MANIFEST_FILE);
            if !manifest_path.is_file() {
                continue;
            }

            let manifest = match load_manifest(&manifest_path) {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!(path = %manifest_path.display(), error = %e, "Skipping invalid manifest");
                    continue;
                }
            };

            if self.records.contains_key(&manifest.name) {
                warn!(
                    module = %manifest.name,
                    path = %dir.display(),
                    "Duplicate module name, keeping the first occurrence"
                );
                continue;
            }

            let verdict = verify_module(&dir, signers)?;
            debug!(module = %manifest.name, verdict = %verdict, "Discovered module");
            self.records.insert(
                manifest.name.clone(),
                ModuleRecord {
                    path: dir,
                    manifest,
                    verdict,
                },
            );
        }
        Ok(())
    }

    /// Resolves a module name to its record.
    #[must_use]
    pub fn resolve(&self, name: &ModuleName) -> Option<&ModuleRecord> {
        self.records.get(name)
    }

    /// Iterates all records, sorted by module name.
    pub fn list_all(&self) -> impl Iterator<Item = (&ModuleName, &ModuleRecord)> {
        self.records.iter()
    }

    /// Number of discovered modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when nothing was discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl ManifestLookup for ModuleRegistry {
    fn manifest(&self, name: &ModuleName) -> Option<&ModuleManifest> {
        self.records.get(name).map(|r| &r.manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_module(root: &Path, dir: &str, name: &str) {
        let module_dir = root.join(dir);
        std::fs::create_dir_all(&module_dir).unwrap();
        std::fs::write(
            module_dir.join(MANIFEST_FILE),
            format!("name: {name}\nversion: 0.1.0\nruntime: {{main: src/main}}\n"),
        )
        .unwrap();
    }

    #[test]
    fn discovers_modules_in_root() {
        let root = TempDir::new().unwrap();
        write_module(root.path(), "alpha", "alpha");
        write_module(root.path(), "beta", "beta");
        // A directory without a manifest is not a module.
        std::fs::create_dir_all(root.path().join("not_a_module")).unwrap();

        let registry =
            ModuleRegistry::discover(&[root.path().to_path_buf()], &TrustedSigners::new()).unwrap();

        assert_eq!(registry.len(), 2);
        let record = registry.resolve(&"alpha".parse().unwrap()).unwrap();
        assert!(matches!(record.verdict, Verdict::Unsigned { .. }));
        assert!(registry.resolve(&"gamma".parse().unwrap()).is_none());
    }

    #[test]
    fn listing_is_name_sorted() {
        let root = TempDir::new().unwrap();
        write_module(root.path(), "zeta_dir", "zeta");
        write_module(root.path(), "alpha_dir", "alpha");

        let registry =
            ModuleRegistry::discover(&[root.path().to_path_buf()], &TrustedSigners::new()).unwrap();
        let names: Vec<&str> = registry.list_all().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["alpha", "zeta"]);
    }

    #[test]
    fn first_root_wins_on_duplicates() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        write_module(first.path(), "mod_dir", "shared");
        write_module(second.path(), "other_dir", "shared");

        let registry = ModuleRegistry::discover(
            &[first.path().to_path_buf(), second.path().to_path_buf()],
            &TrustedSigners::new(),
        )
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry
            .resolve(&"shared".parse().unwrap())
            .unwrap()
            .path
            .starts_with(first.path()));
    }

    #[test]
    fn invalid_manifest_is_skipped() {
        let root = TempDir::new().unwrap();
        write_module(root.path(), "good", "good");
        let bad = root.path().join("bad");
        std::fs::create_dir_all(&bad).unwrap();
        std::fs::write(bad.join(MANIFEST_FILE), "{ broken yaml").unwrap();

        let registry =
            ModuleRegistry::discover(&[root.path().to_path_buf()], &TrustedSigners::new()).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn missing_root_is_skipped() {
        let registry = ModuleRegistry::discover(
            &[PathBuf::from("/nonexistent/modules")],
            &TrustedSigners::new(),
        )
        .unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn manifest_lookup_impl() {
        let root = TempDir::new().unwrap();
        write_module(root.path(), "alpha", "alpha");
        let registry =
            ModuleRegistry::discover(&[root.path().to_path_buf()], &TrustedSigners::new()).unwrap();

        let lookup: &dyn ManifestLookup = &registry;
        assert!(lookup.manifest(&"alpha".parse().unwrap()).is_some());
    }
}
