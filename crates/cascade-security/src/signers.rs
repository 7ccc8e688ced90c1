//! Trusted signer registry.
//!
//! A JSON map of signer id to record, loaded once at engine start and
//! read-only thereafter:
//!
//! ```json
//! {
//!   "release_key": {
//!     "pubkey": "-----BEGIN PUBLIC KEY-----\n...",
//!     "comment": "release signing key"
//!   }
//! }
//! ```

use crate::SecurityError;
use cascade_types::SignerId;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};

/// One trusted signer record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedSigner {
    /// Public key, PEM (SPKI) encoded.
    pub pubkey: String,
    /// Human-readable comment.
    #[serde(default)]
    pub comment: String,
}

/// The registry of trusted signers.
///
/// Keyed by unique signer id; iteration order is the id order, keeping
/// verification attempts and CLI listings deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrustedSigners {
    signers: BTreeMap<SignerId, TrustedSigner>,
}

impl TrustedSigners {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the registry from a JSON file.
    ///
    /// A missing file yields an empty registry (logged): a fresh
    /// installation has nothing to trust yet.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::Registry`] when the file exists but is
    /// malformed.
    pub fn load(path: &Path) -> Result<Self, SecurityError> {
        if !path.exists() {
            warn!(path = %path.display(), "Trusted signers file not found, starting empty");
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path).map_err(|e| SecurityError::io(path, e))?;
        let signers: Self =
            serde_json::from_str(&content).map_err(|e| SecurityError::Registry {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        debug!(path = %path.display(), count = signers.len(), "Loaded trusted signers");
        Ok(signers)
    }

    /// Saves the registry to a JSON file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::Io`] when writing fails.
    pub fn save(&self, path: &Path) -> Result<(), SecurityError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SecurityError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| SecurityError::Registry {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, json).map_err(|e| SecurityError::io(path, e))
    }

    /// Adds or replaces a signer.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::Key`] when the public key PEM does not
    /// parse; a registry never holds an unusable key.
    pub fn add(&mut self, id: SignerId, signer: TrustedSigner) -> Result<(), SecurityError> {
        RsaPublicKey::from_public_key_pem(&signer.pubkey)
            .map_err(|e| SecurityError::key(format!("signer '{id}': {e}")))?;
        self.signers.insert(id, signer);
        Ok(())
    }

    /// Removes a signer.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::UnknownSigner`] when the id is absent.
    pub fn remove(&mut self, id: &SignerId) -> Result<TrustedSigner, SecurityError> {
        self.signers
            .remove(id)
            .ok_or_else(|| SecurityError::UnknownSigner { signer: id.clone() })
    }

    /// Returns the record for a signer id.
    #[must_use]
    pub fn get(&self, id: &SignerId) -> Option<&TrustedSigner> {
        self.signers.get(id)
    }

    /// Returns the parsed public key for a signer id.
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::UnknownSigner`] for an absent id or
    /// [`SecurityError::Key`] for a PEM that no longer parses.
    pub fn public_key(&self, id: &SignerId) -> Result<RsaPublicKey, SecurityError> {
        let signer = self
            .get(id)
            .ok_or_else(|| SecurityError::UnknownSigner { signer: id.clone() })?;
        RsaPublicKey::from_public_key_pem(&signer.pubkey)
            .map_err(|e| SecurityError::key(format!("signer '{id}': {e}")))
    }

    /// Iterates signers in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&SignerId, &TrustedSigner)> {
        self.signers.iter()
    }

    /// Number of registered signers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signers.len()
    }

    /// Returns `true` when no signers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }
}
