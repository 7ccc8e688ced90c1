//! Key-pair utilities.
//!
//! Off the steady-state hot path: used by the `security` CLI
//! subcommands (`generate-keypair`, `sign`, `trust`) and by tests.
//! Signatures are RSA-PSS with SHA-256 over the lowercase hex encoding
//! of the canonical module digest.

use crate::{ModuleDigest, SecurityError};
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::pss::BlindedSigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::path::Path;

/// RSA modulus size for generated key pairs.
pub const KEY_BITS: usize = 2048;

/// Generates a fresh RSA key pair of [`KEY_BITS`] bits.
///
/// # Errors
///
/// Returns [`SecurityError::Key`] when generation fails.
pub fn generate_keypair() -> Result<(RsaPrivateKey, RsaPublicKey), SecurityError> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, KEY_BITS)
        .map_err(|e| SecurityError::key(format!("key generation failed: {e}")))?;
    let public = RsaPublicKey::from(&private);
    Ok((private, public))
}

/// Encodes a private key as PKCS#8 PEM.
///
/// # Errors
///
/// Returns [`SecurityError::Key`] when encoding fails.
pub fn private_key_pem(private: &RsaPrivateKey) -> Result<String, SecurityError> {
    private
        .to_pkcs8_pem(LineEnding::LF)
        .map(|pem| pem.to_string())
        .map_err(|e| SecurityError::key(format!("private key encoding failed: {e}")))
}

/// Extracts the public component of a private key as SPKI PEM.
///
/// # Errors
///
/// Returns [`SecurityError::Key`] when encoding fails.
pub fn public_key_pem(private: &RsaPrivateKey) -> Result<String, SecurityError> {
    RsaPublicKey::from(private)
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| SecurityError::key(format!("public key encoding failed: {e}")))
}

/// Loads a PKCS#8 PEM private key from disk.
///
/// # Errors
///
/// Returns [`SecurityError::Io`] when the file cannot be read, or
/// [`SecurityError::Key`] when it does not parse.
pub fn load_private_key(path: &Path) -> Result<RsaPrivateKey, SecurityError> {
    let pem = std::fs::read_to_string(path).map_err(|e| SecurityError::io(path, e))?;
    RsaPrivateKey::from_pkcs8_pem(&pem)
        .map_err(|e| SecurityError::key(format!("{}: {e}", path.display())))
}

/// Writes `private_key.pem` and `public_key.pem` into `dir`.
///
/// # Errors
///
/// Returns [`SecurityError`] on encoding or write failure.
pub fn save_keypair(private: &RsaPrivateKey, dir: &Path) -> Result<(), SecurityError> {
    std::fs::create_dir_all(dir).map_err(|e| SecurityError::io(dir, e))?;

    let private_path = dir.join("private_key.pem");
    std::fs::write(&private_path, private_key_pem(private)?)
        .map_err(|e| SecurityError::io(&private_path, e))?;

    let public_path = dir.join("public_key.pem");
    std::fs::write(&public_path, public_key_pem(private)?)
        .map_err(|e| SecurityError::io(&public_path, e))?;

    Ok(())
}

/// Produces a detached RSA-PSS(SHA-256) signature over a module
/// digest.
///
/// The preimage is the digest's lowercase hex encoding as UTF-8
/// bytes, matching what [`crate::verify_module`] checks.
#[must_use]
pub fn sign_digest(private: &RsaPrivateKey, digest: &ModuleDigest) -> Vec<u8> {
    let signing_key = BlindedSigningKey::<Sha256>::new(private.clone());
    let mut rng = rand::thread_rng();
    signing_key
        .sign_with_rng(&mut rng, digest.to_hex().as_bytes())
        .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::DecodePublicKey;
    use rsa::pss::VerifyingKey;
    use rsa::signature::Verifier;
    use std::sync::OnceLock;
    use tempfile::TempDir;

    fn shared_keypair() -> &'static (RsaPrivateKey, RsaPublicKey) {
        static PAIR: OnceLock<(RsaPrivateKey, RsaPublicKey)> = OnceLock::new();
        PAIR.get_or_init(|| generate_keypair().unwrap())
    }

    fn test_digest() -> ModuleDigest {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("module.yaml"), b"name: m\n").unwrap();
        crate::compute_digest(dir.path()).unwrap()
    }

    #[test]
    fn pubkey_extraction_round_trips() {
        // extract-pubkey(keypair) recovers the public component.
        let (private, public) = shared_keypair();
        let pem = public_key_pem(private).unwrap();
        let recovered = RsaPublicKey::from_public_key_pem(&pem).unwrap();
        assert_eq!(&recovered, public);
    }

    #[test]
    fn private_key_pem_round_trips() {
        let dir = TempDir::new().unwrap();
        let (private, _) = shared_keypair();
        save_keypair(private, dir.path()).unwrap();

        let loaded = load_private_key(&dir.path().join("private_key.pem")).unwrap();
        assert_eq!(&loaded, private);

        // The sibling public key file parses too.
        let pub_pem = std::fs::read_to_string(dir.path().join("public_key.pem")).unwrap();
        assert!(RsaPublicKey::from_public_key_pem(&pub_pem).is_ok());
    }

    #[test]
    fn signature_verifies_against_public_key() {
        let (private, public) = shared_keypair();
        let digest = test_digest();
        let signature = sign_digest(private, &digest);

        let verifying_key = VerifyingKey::<Sha256>::new(public.clone());
        let parsed = rsa::pss::Signature::try_from(signature.as_slice()).unwrap();
        verifying_key
            .verify(digest.to_hex().as_bytes(), &parsed)
            .unwrap();
    }

    #[test]
    fn signature_rejects_tampered_digest() {
        let (private, public) = shared_keypair();
        let digest = test_digest();
        let signature = sign_digest(private, &digest);

        let verifying_key = VerifyingKey::<Sha256>::new(public.clone());
        let parsed = rsa::pss::Signature::try_from(signature.as_slice()).unwrap();
        assert!(verifying_key
            .verify(b"0000000000000000000000000000000000000000000000000000000000000000", &parsed)
            .is_err());
    }

    #[test]
    fn load_private_key_missing_file() {
        assert!(matches!(
            load_private_key(Path::new("/nonexistent/key.pem")).unwrap_err(),
            SecurityError::Io { .. }
        ));
    }
}
