//! Cryptographic primitives for package signing.

pub mod keys;
pub mod signature;

pub use keys::{ExportError, KeyGenError, Keypair};
pub use signature::{
    SignError, SignatureAlgorithm, VerifyError, sign, sign_with_rng, signature_len, verify,
};
