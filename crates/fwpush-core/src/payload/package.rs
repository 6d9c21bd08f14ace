//! Signed firmware package assembly.
//!
//! Layout: `[FirmwareHeader][signature][public key][firmware]`, contiguous.
//! The signature covers the firmware segment only; the header and the
//! embedded public key are not part of the signed data, so a receiver has
//! to establish trust in the key by other means.

use std::path::Path;

use thiserror::Error;
use tracing::{info, instrument};

use super::loader::{FirmwareImage, LoadError, load_file};
use crate::crypto::{self, ExportError, Keypair, SignError, SignatureAlgorithm, VerifyError};
use crate::protocol::header::{FirmwareHeader, HeaderError};

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("Firmware load failed: {0}")]
    Load(#[from] LoadError),
    #[error("Public key export failed: {0}")]
    Export(#[from] ExportError),
    #[error("Signing failed: {0}")]
    Sign(#[from] SignError),
    #[error("Package assembly failed: {0}")]
    Assembly(String),
    #[error("Malformed package: {0}")]
    Header(#[from] HeaderError),
}

/// An assembled, signed firmware message. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPackage {
    header: FirmwareHeader,
    bytes: Vec<u8>,
}

fn header_field(name: &str, len: usize) -> Result<u32, PackageError> {
    u32::try_from(len)
        .map_err(|_| PackageError::Assembly(format!("{} length {} exceeds u32", name, len)))
}

/// Load a firmware file and build a signed package from it.
#[instrument(skip_all, fields(path = %firmware_path.as_ref().display(), %algorithm))]
pub fn build_package<P: AsRef<Path>>(
    firmware_path: P,
    key: &Keypair,
    algorithm: SignatureAlgorithm,
) -> Result<SignedPackage, PackageError> {
    let image = load_file(firmware_path)?;
    build_package_from_image(&image, key, algorithm)
}

/// Build a signed package from an already loaded image.
pub fn build_package_from_image(
    image: &FirmwareImage,
    key: &Keypair,
    algorithm: SignatureAlgorithm,
) -> Result<SignedPackage, PackageError> {
    let firmware = image.data();

    let public_key = key.export_public_key()?;

    let signature_len =
        crypto::signature_len(algorithm).ok_or(SignError::UnsupportedAlgorithm(algorithm))?;

    info!(
        sig = signature_len,
        key = public_key.len(),
        file = firmware.len(),
        "Firmware message"
    );

    let signature = crypto::sign(algorithm, firmware, key)?;
    if signature.len() != signature_len {
        return Err(SignError::LengthMismatch {
            expected: signature_len,
            actual: signature.len(),
        }
        .into());
    }

    let header = FirmwareHeader::new(
        header_field("signature", signature.len())?,
        header_field("public key", public_key.len())?,
        header_field("firmware", firmware.len())?,
    );
    let total = usize::try_from(header.package_len())
        .map_err(|_| PackageError::Assembly("package length overflows usize".into()))?;

    let mut bytes = Vec::with_capacity(total);
    header.write_to(&mut bytes)?;
    bytes.extend_from_slice(&signature);
    bytes.extend_from_slice(&public_key);
    bytes.extend_from_slice(firmware);
    debug_assert_eq!(bytes.len(), total);

    Ok(SignedPackage { header, bytes })
}

impl SignedPackage {
    /// Parse a package, checking the header describes exactly `bytes`.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, PackageError> {
        let header = FirmwareHeader::from_package(&bytes)?;
        Ok(Self { header, bytes })
    }

    pub fn header(&self) -> &FirmwareHeader {
        &self.header
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn segment(&self, offset: usize, len: u32) -> &[u8] {
        &self.bytes[offset..offset + len as usize]
    }

    pub fn signature(&self) -> &[u8] {
        self.segment(FirmwareHeader::SIZE, self.header.signature_len)
    }

    pub fn public_key(&self) -> &[u8] {
        let offset = FirmwareHeader::SIZE + self.header.signature_len as usize;
        self.segment(offset, self.header.public_key_len)
    }

    pub fn firmware(&self) -> &[u8] {
        let offset = FirmwareHeader::SIZE
            + self.header.signature_len as usize
            + self.header.public_key_len as usize;
        self.segment(offset, self.header.firmware_len)
    }

    /// Check the embedded signature against the firmware segment using the
    /// embedded public key.
    pub fn verify(&self, algorithm: SignatureAlgorithm) -> Result<(), VerifyError> {
        crypto::verify(algorithm, self.firmware(), self.signature(), self.public_key())
    }
}
