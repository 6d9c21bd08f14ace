//! Ephemeral signing keys.
//!
//! A fresh P-256 key is generated per run from the OS CSPRNG. The public
//! half is exported as a SEC1 uncompressed point (`0x04 || X || Y`), which
//! carries its own format tag so receivers can decode it without metadata.

use std::fmt;

use p256::FieldBytes;
use p256::ecdsa::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyGenError {
    #[error("Entropy source unavailable: {0}")]
    EntropyUnavailable(String),
    #[error("Key generation rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Public key needs {required} bytes, buffer holds {available}")]
    BufferTooSmall { required: usize, available: usize },
}

/// Asymmetric signing keypair (ECDSA over NIST P-256).
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a fresh keypair from the operating system RNG.
    pub fn generate() -> Result<Self, KeyGenError> {
        Self::generate_with(&mut OsRng)
    }

    /// Generate a keypair from the given RNG.
    pub fn generate_with<R: RngCore + CryptoRng>(rng: &mut R) -> Result<Self, KeyGenError> {
        let mut seed = FieldBytes::default();
        rng.try_fill_bytes(&mut seed)
            .map_err(|e| KeyGenError::EntropyUnavailable(e.to_string()))?;
        let signing_key =
            SigningKey::from_bytes(&seed).map_err(|e| KeyGenError::Rejected(e.to_string()))?;
        Ok(Self { signing_key })
    }

    /// Rebuild a keypair from a 32-byte secret scalar.
    #[cfg(test)]
    pub(crate) fn from_secret_bytes(secret: &[u8]) -> Result<Self, KeyGenError> {
        let signing_key =
            SigningKey::from_slice(secret).map_err(|e| KeyGenError::Rejected(e.to_string()))?;
        Ok(Self { signing_key })
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        *self.signing_key.verifying_key()
    }

    /// Exact length of the exported public key.
    pub fn public_key_len(&self) -> usize {
        self.verifying_key().to_encoded_point(false).len()
    }

    /// Export the public key into `out`, returning the number of bytes written.
    pub fn export_public_key_into(&self, out: &mut [u8]) -> Result<usize, ExportError> {
        let point = self.verifying_key().to_encoded_point(false);
        let encoded = point.as_bytes();
        if out.len() < encoded.len() {
            return Err(ExportError::BufferTooSmall {
                required: encoded.len(),
                available: out.len(),
            });
        }
        out[..encoded.len()].copy_from_slice(encoded);
        Ok(encoded.len())
    }

    /// Export the public key into an exact-size buffer.
    pub fn export_public_key(&self) -> Result<Vec<u8>, ExportError> {
        let mut out = vec![0u8; self.public_key_len()];
        let written = self.export_public_key_into(&mut out)?;
        out.truncate(written);
        Ok(out)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("curve", &"P-256")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingRng;

    impl RngCore for FailingRng {
        fn next_u32(&mut self) -> u32 {
            0
        }
        fn next_u64(&mut self) -> u64 {
            0
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }
        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::other("no entropy")))
        }
    }

    impl CryptoRng for FailingRng {}

    struct ZeroRng;

    impl RngCore for ZeroRng {
        fn next_u32(&mut self) -> u32 {
            0
        }
        fn next_u64(&mut self) -> u64 {
            0
        }
        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }
        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            dest.fill(0);
            Ok(())
        }
    }

    impl CryptoRng for ZeroRng {}

    #[test]
    fn test_public_key_is_uncompressed_point() {
        let key = Keypair::generate().unwrap();
        assert_eq!(key.public_key_len(), 65);
        let exported = key.export_public_key().unwrap();
        assert_eq!(exported.len(), 65);
        assert_eq!(exported[0], 0x04);
        assert!(VerifyingKey::from_sec1_bytes(&exported).is_ok());
    }

    #[test]
    fn test_keys_are_fresh_per_generation() {
        let a = Keypair::generate().unwrap().export_public_key().unwrap();
        let b = Keypair::generate().unwrap().export_public_key().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_export_refuses_to_truncate() {
        let key = Keypair::generate().unwrap();
        let mut small = [0u8; 64];
        assert!(matches!(
            key.export_public_key_into(&mut small),
            Err(ExportError::BufferTooSmall { required: 65, available: 64 })
        ));

        let mut large = [0u8; 80];
        assert_eq!(key.export_public_key_into(&mut large).unwrap(), 65);
        assert_eq!(large[0], 0x04);
    }

    #[test]
    fn test_entropy_failure_is_reported() {
        assert!(matches!(
            Keypair::generate_with(&mut FailingRng),
            Err(KeyGenError::EntropyUnavailable(_))
        ));
    }

    #[test]
    fn test_zero_scalar_is_rejected() {
        assert!(matches!(
            Keypair::generate_with(&mut ZeroRng),
            Err(KeyGenError::Rejected(_))
        ));
    }

    #[test]
    fn test_from_secret_bytes() {
        let mut secret = [0u8; 32];
        secret[31] = 7;
        let a = Keypair::from_secret_bytes(&secret).unwrap();
        let b = Keypair::from_secret_bytes(&secret).unwrap();
        assert_eq!(a.export_public_key().unwrap(), b.export_public_key().unwrap());
        assert!(Keypair::from_secret_bytes(&[1u8; 16]).is_err());
        assert!(Keypair::from_secret_bytes(&[0u8; 32]).is_err());
    }
}
