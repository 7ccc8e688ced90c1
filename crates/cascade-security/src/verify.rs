//! Detached-signature verification.
//!
//! The verification ladder for a module directory:
//!
//! 1. No `module.sig` → [`Verdict::Unsigned`].
//! 2. Signature verifies under a trusted key →
//!    [`Verdict::VerifiedByTrusted`] with the signer id.
//! 3. Signature verifies under no trusted key but has a plausible RSA
//!    signature length → [`Verdict::SignedUntrusted`].
//! 4. Otherwise → [`Verdict::Invalid`].
//!
//! The signature covers the lowercase hex encoding of the canonical
//! digest as UTF-8 bytes.

use crate::{compute_digest, sign_digest, ModuleDigest, SecurityError, TrustedSigners};
use cascade_types::SignerId;
use rsa::pss::VerifyingKey;
use rsa::signature::Verifier;
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use sha2::Sha256;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// File name of the detached signature inside a module directory.
pub const SIGNATURE_FILE: &str = "module.sig";

/// Signature byte lengths considered plausible when the registry holds
/// no keys to compare against: 2048-, 3072-, and 4096-bit moduli.
const STANDARD_SIGNATURE_LENGTHS: &[usize] = &[256, 384, 512];

/// Outcome of verifying one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The signature verifies under a trusted key.
    VerifiedByTrusted {
        /// The signer whose key verified.
        signer: SignerId,
        /// The computed content digest.
        digest: ModuleDigest,
    },
    /// The signature is well-formed but no trusted key verifies it.
    SignedUntrusted {
        /// The computed content digest.
        digest: ModuleDigest,
    },
    /// No signature file is present.
    Unsigned {
        /// The computed content digest.
        digest: ModuleDigest,
    },
    /// A signature is present but is not a plausible RSA signature.
    Invalid {
        /// The computed content digest.
        digest: ModuleDigest,
    },
}

impl Verdict {
    /// Returns the computed content digest.
    #[must_use]
    pub fn digest(&self) -> &ModuleDigest {
        match self {
            Self::VerifiedByTrusted { digest, .. }
            | Self::SignedUntrusted { digest }
            | Self::Unsigned { digest }
            | Self::Invalid { digest } => digest,
        }
    }

    /// Returns the trusted signer id, when verified.
    #[must_use]
    pub fn signer(&self) -> Option<&SignerId> {
        match self {
            Self::VerifiedByTrusted { signer, .. } => Some(signer),
            _ => None,
        }
    }

    /// Returns `true` for [`Verdict::VerifiedByTrusted`].
    #[must_use]
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::VerifiedByTrusted { .. })
    }

    /// Short label used in logs and admission prompts.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::VerifiedByTrusted { .. } => "verified",
            Self::SignedUntrusted { .. } => "signed by an untrusted signer",
            Self::Unsigned { .. } => "unsigned",
            Self::Invalid { .. } => "carrying an invalid signature",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VerifiedByTrusted { signer, .. } => write!(f, "verified (signer: {signer})"),
            _ => f.write_str(self.label()),
        }
    }
}

/// Verifies a module directory against the trusted signers.
///
/// # Errors
///
/// Returns [`SecurityError`] only for I/O failures (unreadable
/// directory or signature file); every verification outcome, including
/// a garbage signature, is expressed as a [`Verdict`].
pub fn verify_module(
    module_dir: &Path,
    signers: &TrustedSigners,
) -> Result<Verdict, SecurityError> {
    let digest = compute_digest(module_dir)?;

    let sig_path = module_dir.join(SIGNATURE_FILE);
    if !sig_path.exists() {
        debug!(module = %module_dir.display(), "No signature file");
        return Ok(Verdict::Unsigned { digest });
    }
    let signature_bytes =
        std::fs::read(&sig_path).map_err(|e| SecurityError::io(&sig_path, e))?;

    let preimage = digest.to_hex();
    let mut registered_lengths: Vec<usize> = Vec::new();

    if let Ok(signature) = rsa::pss::Signature::try_from(signature_bytes.as_slice()) {
        for (id, _) in signers.iter() {
            let public = match signers.public_key(id) {
                Ok(key) => key,
                Err(e) => {
                    warn!(signer = %id, error = %e, "Skipping unusable trusted key");
                    continue;
                }
            };
            registered_lengths.push(public.size());

            let verifying_key = VerifyingKey::<Sha256>::new(public);
            if verifying_key.verify(preimage.as_bytes(), &signature).is_ok() {
                info!(module = %module_dir.display(), signer = %id, "Module verified");
                return Ok(Verdict::VerifiedByTrusted {
                    signer: id.clone(),
                    digest,
                });
            }
        }
    }

    let plausible = if registered_lengths.is_empty() {
        STANDARD_SIGNATURE_LENGTHS.contains(&signature_bytes.len())
    } else {
        registered_lengths.contains(&signature_bytes.len())
            || STANDARD_SIGNATURE_LENGTHS.contains(&signature_bytes.len())
    };

    if plausible {
        warn!(module = %module_dir.display(), "Signature well-formed but not from a trusted signer");
        Ok(Verdict::SignedUntrusted { digest })
    } else {
        warn!(module = %module_dir.display(), "Invalid signature");
        Ok(Verdict::Invalid { digest })
    }
}

/// Signs a module directory, writing `module.sig` next to its files.
///
/// Any existing signature is excluded from the digest by definition,
/// so re-signing is idempotent with respect to content.
///
/// # Errors
///
/// Returns [`SecurityError`] on digest or write failure.
pub fn sign_module(module_dir: &Path, private: &RsaPrivateKey) -> Result<ModuleDigest, SecurityError> {
    let digest = compute_digest(module_dir)?;
    let signature = sign_digest(private, &digest);
    let sig_path = module_dir.join(SIGNATURE_FILE);
    std::fs::write(&sig_path, signature).map_err(|e| SecurityError::io(&sig_path, e))?;
    info!(module = %module_dir.display(), digest = %digest, "Module signed");
    Ok(digest)
}
