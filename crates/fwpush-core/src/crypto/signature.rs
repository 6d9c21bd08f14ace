//! Hash-then-sign primitives.

use std::fmt;

use p256::ecdsa::signature::{DigestVerifier, RandomizedDigestSigner};
use p256::ecdsa::{Signature, VerifyingKey};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::keys::Keypair;

/// Supported signature schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    /// SHA-256 digest, ECDSA P-256, fixed-width `r || s` encoding (64 bytes).
    #[default]
    EcdsaP256Sha256,
    /// SHA-256 digest, ECDSA P-256, ASN.1 DER encoding (variable width).
    EcdsaP256Sha256Der,
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignatureAlgorithm::EcdsaP256Sha256 => write!(f, "ECDSA-P256-SHA256"),
            SignatureAlgorithm::EcdsaP256Sha256Der => write!(f, "ECDSA-P256-SHA256-DER"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SignError {
    #[error("Signature type {0} has no fixed size")]
    UnsupportedAlgorithm(SignatureAlgorithm),
    #[error("Signature generation failed: {0}")]
    Failed(String),
    #[error("Signature is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Invalid public key: {0}")]
    InvalidKey(String),
    #[error("Malformed signature: {0}")]
    MalformedSignature(String),
    #[error("Signature does not match payload")]
    Mismatch,
}

/// Exact signature length for `algorithm`, or `None` when the encoding
/// length depends on the signature value.
pub fn signature_len(algorithm: SignatureAlgorithm) -> Option<usize> {
    match algorithm {
        SignatureAlgorithm::EcdsaP256Sha256 => Some(64),
        SignatureAlgorithm::EcdsaP256Sha256Der => None,
    }
}

/// Sign `data` with a fresh nonce from the OS RNG.
pub fn sign(algorithm: SignatureAlgorithm, data: &[u8], key: &Keypair) -> Result<Vec<u8>, SignError> {
    sign_with_rng(algorithm, data, key, &mut OsRng)
}

pub fn sign_with_rng<R: RngCore + CryptoRng>(
    algorithm: SignatureAlgorithm,
    data: &[u8],
    key: &Keypair,
    rng: &mut R,
) -> Result<Vec<u8>, SignError> {
    let digest = Sha256::new_with_prefix(data);
    let signature: Signature = key
        .signing_key()
        .try_sign_digest_with_rng(rng, digest)
        .map_err(|e| SignError::Failed(e.to_string()))?;

    match algorithm {
        SignatureAlgorithm::EcdsaP256Sha256 => Ok(signature.to_bytes().to_vec()),
        SignatureAlgorithm::EcdsaP256Sha256Der => Ok(signature.to_der().as_bytes().to_vec()),
    }
}

/// Check `signature` over `data` against a SEC1-encoded public key.
pub fn verify(
    algorithm: SignatureAlgorithm,
    data: &[u8],
    signature: &[u8],
    public_key: &[u8],
) -> Result<(), VerifyError> {
    let key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| VerifyError::InvalidKey(e.to_string()))?;
    let signature = match algorithm {
        SignatureAlgorithm::EcdsaP256Sha256 => Signature::from_slice(signature),
        SignatureAlgorithm::EcdsaP256Sha256Der => Signature::from_der(signature),
    }
    .map_err(|e| VerifyError::MalformedSignature(e.to_string()))?;

    key.verify_digest(Sha256::new_with_prefix(data), &signature)
        .map_err(|_| VerifyError::Mismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_signature_size() {
        let key = Keypair::generate().unwrap();
        let sig = sign(SignatureAlgorithm::EcdsaP256Sha256, b"firmware", &key).unwrap();
        assert_eq!(Some(sig.len()), signature_len(SignatureAlgorithm::EcdsaP256Sha256));
    }

    #[test]
    fn test_der_has_no_fixed_size() {
        assert_eq!(signature_len(SignatureAlgorithm::EcdsaP256Sha256Der), None);
    }

    #[test]
    fn test_sign_verify() {
        let key = Keypair::generate().unwrap();
        let public = key.export_public_key().unwrap();
        for alg in [
            SignatureAlgorithm::EcdsaP256Sha256,
            SignatureAlgorithm::EcdsaP256Sha256Der,
        ] {
            let sig = sign(alg, b"image bytes", &key).unwrap();
            verify(alg, b"image bytes", &sig, &public).unwrap();
            assert!(matches!(
                verify(alg, b"image bytez", &sig, &public),
                Err(VerifyError::Mismatch)
            ));
        }
    }

    #[test]
    fn test_sign_empty_payload() {
        let key = Keypair::generate().unwrap();
        let public = key.export_public_key().unwrap();
        let sig = sign(SignatureAlgorithm::EcdsaP256Sha256, &[], &key).unwrap();
        verify(SignatureAlgorithm::EcdsaP256Sha256, &[], &sig, &public).unwrap();
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = Keypair::generate().unwrap();
        let other = Keypair::generate().unwrap().export_public_key().unwrap();
        let sig = sign(SignatureAlgorithm::EcdsaP256Sha256, b"data", &key).unwrap();
        assert!(verify(SignatureAlgorithm::EcdsaP256Sha256, b"data", &sig, &other).is_err());
    }

    #[test]
    fn test_malformed_inputs() {
        let key = Keypair::generate().unwrap();
        let public = key.export_public_key().unwrap();
        assert!(matches!(
            verify(SignatureAlgorithm::EcdsaP256Sha256, b"d", &[0u8; 10], &public),
            Err(VerifyError::MalformedSignature(_))
        ));
        assert!(matches!(
            verify(SignatureAlgorithm::EcdsaP256Sha256, b"d", &[1u8; 64], &[0x04, 0x01]),
            Err(VerifyError::InvalidKey(_))
        ));
    }
}
