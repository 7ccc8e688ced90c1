//! Module integrity for cascade.
//!
//! Modules are admitted into a pipeline only after their on-disk
//! content is verified against a registry of trusted signers:
//!
//! ```text
//! module dir ──► canonical digest (SHA-256 over sorted file tree)
//!                     │
//! module.sig ──► RSA-PSS(SHA-256) verify against each trusted key
//!                     │
//!                     ▼
//!   Verdict: VerifiedByTrusted | SignedUntrusted | Unsigned | Invalid
//!                     │
//!                     ▼
//!   Admission policy (paranoid / default / permissive) ─► admit / reject / prompt
//! ```
//!
//! The digest definition is bit-stable across platforms: hashing the
//! same file set always yields the same digest, regardless of
//! directory iteration order or path separator convention.

mod admission;
mod digest;
mod error;
mod keys;
mod signers;
mod verify;

pub use admission::{
    Admission, AdmissionPolicy, AdmissionPrompt, DenyingPrompt, PromptDecision, SecurityMode,
};
pub use digest::{compute_digest, ModuleDigest};
pub use error::SecurityError;
pub use keys::{
    generate_keypair, load_private_key, private_key_pem, public_key_pem, save_keypair, sign_digest,
    KEY_BITS,
};
pub use signers::{TrustedSigner, TrustedSigners};
pub use verify::{sign_module, verify_module, Verdict, SIGNATURE_FILE};
