//! Firmware package header.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Length mismatch: header describes {described} bytes, package has {actual}")]
    LengthMismatch { described: u64, actual: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Firmware Header (12 bytes / 0x0C)
///
/// Prefixes every signed package and records the length of each segment
/// that follows it: signature, public key, firmware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct FirmwareHeader {
    pub signature_len: u32,
    pub public_key_len: u32,
    pub firmware_len: u32,
}

impl FirmwareHeader {
    pub const SIZE: usize = 12;

    pub fn new(signature_len: u32, public_key_len: u32, firmware_len: u32) -> Self {
        Self {
            signature_len,
            public_key_len,
            firmware_len,
        }
    }

    /// Total package length described by this header, header included.
    pub fn package_len(&self) -> u64 {
        Self::SIZE as u64
            + u64::from(self.signature_len)
            + u64::from(self.public_key_len)
            + u64::from(self.firmware_len)
    }

    pub fn write_to<W: Write>(&self, buf: &mut W) -> Result<(), HeaderError> {
        buf.write_u32::<LittleEndian>(self.signature_len)?;
        buf.write_u32::<LittleEndian>(self.public_key_len)?;
        buf.write_u32::<LittleEndian>(self.firmware_len)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut cursor = Cursor::new([0u8; Self::SIZE]);
        // Three u32 fields fill the array exactly.
        let written = self.write_to(&mut cursor);
        debug_assert!(written.is_ok());
        cursor.into_inner()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        Ok(Self {
            signature_len: cursor.read_u32::<LittleEndian>()?,
            public_key_len: cursor.read_u32::<LittleEndian>()?,
            firmware_len: cursor.read_u32::<LittleEndian>()?,
        })
    }

    /// Parse a header and check it describes exactly `data.len()` bytes.
    pub fn from_package(data: &[u8]) -> Result<Self, HeaderError> {
        let header = Self::from_bytes(data)?;
        if header.package_len() != data.len() as u64 {
            return Err(HeaderError::LengthMismatch {
                described: header.package_len(),
                actual: data.len(),
            });
        }
        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout_is_little_endian() {
        let header = FirmwareHeader::new(64, 65, 0x01020304);
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), FirmwareHeader::SIZE);
        assert_eq!(&bytes[0..4], &[64, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[65, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[0x04, 0x03, 0x02, 0x01]);

        let mut written = Vec::new();
        header.write_to(&mut written).unwrap();
        assert_eq!(written, bytes);
    }

    #[test]
    fn test_write_to_short_buffer_fails() {
        let mut buf = [0u8; 8];
        let mut cursor = Cursor::new(&mut buf[..]);
        assert!(FirmwareHeader::new(1, 2, 3).write_to(&mut cursor).is_err());
    }

    #[test]
    fn test_header_parse() {
        let parsed = FirmwareHeader::from_bytes(&[1, 0, 0, 0, 2, 0, 0, 0, 3, 0, 0, 0]).unwrap();
        assert_eq!(parsed, FirmwareHeader::new(1, 2, 3));
        assert_eq!(parsed.package_len(), 18);
    }

    #[test]
    fn test_header_too_short() {
        assert!(matches!(
            FirmwareHeader::from_bytes(&[0u8; 8]),
            Err(HeaderError::BufferTooSmall { expected: 12, actual: 8 })
        ));
    }

    #[test]
    fn test_package_length_mismatch() {
        let mut data = FirmwareHeader::new(1, 1, 1).to_bytes().to_vec();
        data.extend_from_slice(&[0xAA, 0xBB]);
        assert!(matches!(
            FirmwareHeader::from_package(&data),
            Err(HeaderError::LengthMismatch { described: 15, actual: 14 })
        ));
        data.push(0xCC);
        assert!(FirmwareHeader::from_package(&data).is_ok());
    }
}
