//! Canonical module digest.
//!
//! The digest is a single SHA-256 over the module's file tree:
//!
//! 1. Enumerate regular files recursively, excluding `*.sig` files and
//!    anything under a byte-code cache directory.
//! 2. Sort by relative path, forward-slash separated.
//! 3. For each file in order feed `relative-path`, NUL, file bytes,
//!    NUL into the hash.
//!
//! The path framing makes the digest sensitive to renames and
//! immune to file concatenation ambiguity, and the sort makes it
//! independent of directory iteration order. The definition is
//! bit-identical across platforms: Windows path separators are
//! normalised to `/` before hashing.

use crate::SecurityError;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Directory segments excluded from the digest.
const CACHE_DIR_SEGMENTS: &[&str] = &["__pycache__", ".cache"];

/// Suffix of detached signature files, excluded from the digest.
const SIG_SUFFIX: &str = ".sig";

/// The canonical SHA-256 digest of a module directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleDigest([u8; 32]);

impl ModuleDigest {
    /// Returns the raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the lowercase hex encoding.
    ///
    /// This string (as UTF-8 bytes) is the signature preimage, so it
    /// must stay stable.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ModuleDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Computes the canonical digest of a module directory.
///
/// # Errors
///
/// Returns [`SecurityError::Io`] when the directory or one of its
/// files cannot be read.
pub fn compute_digest(module_dir: &Path) -> Result<ModuleDigest, SecurityError> {
    let mut files = collect_files(module_dir, module_dir)?;
    files.sort();

    let mut hasher = Sha256::new();
    for rel in &files {
        let abs = module_dir.join(rel.replace('/', std::path::MAIN_SEPARATOR_STR));
        let bytes = std::fs::read(&abs).map_err(|e| SecurityError::io(&abs, e))?;
        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        hasher.update(&bytes);
        hasher.update([0u8]);
    }

    Ok(ModuleDigest(hasher.finalize().into()))
}

/// Recursively collects relative paths of digestable regular files,
/// forward-slash separated.
fn collect_files(root: &Path, dir: &Path) -> Result<Vec<String>, SecurityError> {
    let mut out = Vec::new();
    let entries = std::fs::read_dir(dir).map_err(|e| SecurityError::io(dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| SecurityError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| SecurityError::io(&path, e))?;
        let name = entry.file_name().to_string_lossy().into_owned();

        if file_type.is_dir() {
            if CACHE_DIR_SEGMENTS.contains(&name.as_str()) {
                continue;
            }
            out.extend(collect_files(root, &path)?);
        } else if file_type.is_file() && !name.ends_with(SIG_SUFFIX) {
            let rel = path
                .strip_prefix(root)
                .map_err(|_| SecurityError::io(&path, std::io::Error::other("outside root")))?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            out.push(rel);
        }
    }

    Ok(out)
}
